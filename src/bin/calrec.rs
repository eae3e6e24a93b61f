//! Calibration record host tool
//!
//! This binary runs on your PC and works with calibration records dumped
//! from (or destined for) a controller's EEPROM or flash.
//!
//! ## Usage
//!
//! ```bash
//! # Inspect a record (24-byte legacy or 36-byte framed, hex)
//! cargo run --features std --bin calrec -- decode 0000904100000042ffffffff...
//!
//! # Produce a record from known coefficients
//! cargo run --features std --bin calrec -- encode 2.0 1.0 --framed
//!
//! # Fit from two reference points and produce a record
//! cargo run --features std --bin calrec -- fit 0 32 10 212
//!
//! # Translate a raw value through a stored record
//! cargo run --features std --bin calrec -- translate <hex> 212
//! ```
//!
//! ## Commands
//!
//! - `decode <hex>` - Show the model held by a record
//! - `encode <gain> <offset> [--framed]` - Encode known coefficients
//! - `fit <x0> <y0> <x1> <y1> [--framed]` - Calibrate from two points and encode
//! - `translate <hex> <raw>` - Convert a raw value with a stored record
//! - `help` - Show help

use hmi_calibration::record::{self, FRAMED_RECORD_LEN, LEGACY_RECORD_LEN};
use hmi_calibration::{RecordFormat, TwoPointCalibration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    if args.is_empty() || args[0] == "help" || args[0] == "--help" || args[0] == "-h" {
        print_help();
        return Ok(());
    }

    let framed = args.contains(&"--framed");
    let positional: Vec<&str> = args
        .iter()
        .copied()
        .filter(|a| !a.starts_with("--"))
        .collect();
    let format = if framed {
        RecordFormat::Framed
    } else {
        RecordFormat::Legacy
    };

    let command = positional.first().copied().unwrap_or_default();
    match command {
        "decode" => {
            let hex = positional.get(1).ok_or("Usage: decode <hex>")?;
            let (model, format) = decode_hex(hex)?;
            display_model(&model, format);
        }

        "encode" => {
            if positional.len() < 3 {
                return Err("Usage: encode <gain> <offset> [--framed]".into());
            }
            let gain = parse_f32(positional[1], "gain")?;
            let offset = parse_f32(positional[2], "offset")?;
            if gain == 0.0 {
                return Err("Gain must be non-zero".into());
            }

            let model = TwoPointCalibration::with_gain_offset(gain, offset);
            display_model(&model, format);
            println!("{}", encode_hex(&model, format)?);
        }

        "fit" => {
            if positional.len() < 5 {
                return Err("Usage: fit <x0> <y0> <x1> <y1> [--framed]".into());
            }
            let x0 = parse_f32(positional[1], "x0")?;
            let y0 = parse_f32(positional[2], "y0")?;
            let x1 = parse_f32(positional[3], "x1")?;
            let y1 = parse_f32(positional[4], "y1")?;

            let mut model = TwoPointCalibration::new();
            model.try_calibrate([x0, x1], [y0, y1])?;
            display_model(&model, format);
            println!("{}", encode_hex(&model, format)?);
        }

        "translate" => {
            if positional.len() < 3 {
                return Err("Usage: translate <hex> <raw>".into());
            }
            let (model, _) = decode_hex(positional[1])?;
            let raw = parse_f32(positional[2], "raw value")?;
            println!("{}", model.translate(raw));
        }

        cmd => return Err(format!("Unknown command: {} (try 'help')", cmd).into()),
    }

    Ok(())
}

fn print_help() {
    println!("calrec - two-point calibration record tool");
    println!();
    println!("Commands:");
    println!("  decode <hex>                          Show the model held by a record");
    println!("  encode <gain> <offset> [--framed]     Encode known coefficients");
    println!("  fit <x0> <y0> <x1> <y1> [--framed]    Calibrate from two points and encode");
    println!("  translate <hex> <raw>                 Convert a raw value with a stored record");
    println!("  help                                  Show this help");
    println!();
    println!(
        "Records are {} bytes (legacy) or {} bytes (framed), given as hex.",
        LEGACY_RECORD_LEN, FRAMED_RECORD_LEN
    );
}

fn parse_f32(s: &str, what: &str) -> Result<f32, String> {
    s.parse::<f32>().map_err(|_| format!("Invalid {} (must be a number)", what))
}

/// Parse a hex string, ignoring whitespace and `:`/`-` separators
fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();

    if digits.len() % 2 != 0 {
        return Err("Hex string has an odd number of digits".to_string());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| "Invalid hex".to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("Invalid hex byte '{}'", text))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decode a hex record, picking the format from its length
fn decode_hex(hex: &str) -> Result<(TwoPointCalibration, RecordFormat), String> {
    let bytes = parse_hex(hex)?;
    let format = match bytes.len() {
        LEGACY_RECORD_LEN => RecordFormat::Legacy,
        FRAMED_RECORD_LEN => RecordFormat::Framed,
        n => {
            return Err(format!(
                "Record is {} bytes, expected {} or {}",
                n, LEGACY_RECORD_LEN, FRAMED_RECORD_LEN
            ))
        }
    };

    let mut model = TwoPointCalibration::new();
    record::decode(&mut model, format, &bytes).map_err(|e| format!("Decode failed: {}", e))?;
    Ok((model, format))
}

fn encode_hex(model: &TwoPointCalibration, format: RecordFormat) -> Result<String, String> {
    let mut buf = [0u8; FRAMED_RECORD_LEN];
    let len =
        record::encode(model, format, &mut buf).map_err(|e| format!("Encode failed: {}", e))?;
    Ok(to_hex(&buf[..len]))
}

fn display_model(model: &TwoPointCalibration, format: RecordFormat) {
    println!("\nCalibration ({:?} record):", format);
    println!("{:-<50}", "");
    println!("Gain:         {}", model.gain());
    println!("Offset:       {}", model.offset());
    println!("Calibrated:   {}", if model.is_calibrated() { "YES" } else { "NO" });
    match model.reference() {
        Some(reference) => {
            let (x, y) = (reference.inputs, reference.outputs);
            println!("Reference:    x = [{}, {}]", x[0], x[1]);
            println!("              y = [{}, {}]", y[0], y[1]);
        }
        None => println!("Reference:    (unknown)"),
    }
    println!("{:-<50}", "");

    if !model.gain().is_finite() || !model.offset().is_finite() {
        println!("WARNING: coefficients are not finite, region may be erased or corrupt");
    }
}
