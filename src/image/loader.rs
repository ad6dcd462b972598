//! Text image format.
//!
//! One memory cell per line:
//! - `ADDRESS WORD` or `ADDRESS:WORD`, both hexadecimal (`0x` optional)
//! - Lines starting with `;` or `#` are comments, as is anything after `;`
//! - Blank lines are ignored
//!
//! Bad lines never abort a load. Each one is reported and skipped.

use super::{Image, ImageError};
use crate::cpu::{Memory, Word};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// A parsed image plus the lines that had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct LoadedImage {
    pub image: Image,
    pub diagnostics: Vec<ImageError>,
}

/// Parse image text.
pub fn parse_image(text: &str) -> LoadedImage {
    let mut loaded = LoadedImage::default();

    for (index, line) in text.lines().enumerate() {
        let line_num = index + 1;
        let content = line.split(';').next().unwrap_or("").trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        if let Err(e) = parse_line(content).and_then(|(a, w)| loaded.image.insert_raw(a, w)) {
            let e = e.at_line(line_num);
            warn!("{e}");
            loaded.diagnostics.push(e);
        }
    }

    loaded
}

fn parse_line(content: &str) -> Result<(u32, u32), ImageError> {
    let mut tokens = content
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|t| !t.is_empty());

    let (Some(addr_tok), Some(word_tok)) = (tokens.next(), tokens.next()) else {
        return Err(ImageError::MalformedWord { line: None, token: content.to_string() });
    };

    let address = parse_hex(addr_tok)
        .ok_or_else(|| ImageError::MalformedWord { line: None, token: addr_tok.to_string() })?;
    let address = u32::try_from(address)
        .map_err(|_| ImageError::InvalidAddress { line: None, address })?;
    let word = parse_hex(word_tok)
        .and_then(|w| u32::try_from(w).ok())
        .ok_or_else(|| ImageError::MalformedWord { line: None, token: word_tok.to_string() })?;

    Ok((address, word))
}

fn parse_hex(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).ok()
}

/// Load an image file from disk.
pub fn load_image_file<P: AsRef<Path>>(path: P) -> Result<LoadedImage, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::Io(e.to_string()))?;
    Ok(parse_image(&text))
}

/// Render the non-zero cells of memory as image text.
pub fn format_memory(mem: &Memory) -> String {
    let mut out = String::from("; Mano image\n");
    for (addr, word) in mem.non_zero() {
        out.push_str(&format_cell(addr.value(), word));
    }
    out
}

fn format_cell(addr: u16, word: Word) -> String {
    format!("{addr:03X} {word:04X}\n")
}

/// Save an image to disk.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::Io(e.to_string()))?;

    writeln!(file, "; Mano image")
        .map_err(|e| ImageError::Io(e.to_string()))?;
    writeln!(file, "; {} cells", image.len())
        .map_err(|e| ImageError::Io(e.to_string()))?;

    for (addr, word) in image.iter() {
        file.write_all(format_cell(addr.value(), word).as_bytes())
            .map_err(|e| ImageError::Io(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Address;

    #[test]
    fn test_parse_formats() {
        let loaded = parse_image(
            "; demo\n\
             000 2005\n\
             001:7001   ; halt\n\
             # comment\n\
             \n\
             0x005 0x1234\n",
        );

        assert!(loaded.diagnostics.is_empty());
        assert_eq!(loaded.image.len(), 3);
        assert_eq!(loaded.image.get(Address::new(1)), Some(0x7001));
        assert_eq!(loaded.image.get(Address::new(5)), Some(0x1234));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let loaded = parse_image("000 2005\n1000 7001\n002 XYZ\n003\n004 12345\n005 7001\n");

        assert_eq!(loaded.image.len(), 2);
        assert_eq!(loaded.diagnostics.len(), 4);
        assert_eq!(
            loaded.diagnostics[0],
            ImageError::InvalidAddress { line: Some(2), address: 0x1000 }
        );
        assert_eq!(
            loaded.diagnostics[1],
            ImageError::MalformedWord { line: Some(3), token: "XYZ".into() }
        );
        assert!(matches!(loaded.diagnostics[2], ImageError::MalformedWord { line: Some(4), .. }));
        assert!(matches!(loaded.diagnostics[3], ImageError::MalformedWord { line: Some(5), .. }));
    }

    #[test]
    fn test_wide_address_is_invalid_address() {
        let loaded = parse_image("100000000 1234
0x1000 7001
");
        assert!(loaded.image.is_empty());
        assert_eq!(
            loaded.diagnostics,
            [
                ImageError::InvalidAddress { line: Some(1), address: 0x1_0000_0000 },
                ImageError::InvalidAddress { line: Some(2), address: 0x1000 },
            ]
        );
    }

    #[test]
    fn test_save_and_reload() {
        let image = Image::from([(0, 0x2005), (1, 0x7001), (5, 0x1234)]);
        let path = std::env::temp_dir().join(format!("mano-image-{}.txt", std::process::id()));

        save_image(&path, &image).unwrap();
        let loaded = load_image_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(loaded.diagnostics.is_empty());
        assert_eq!(loaded.image, image);
    }

    #[test]
    fn test_missing_file() {
        let result = load_image_file("/nonexistent/mano/image.txt");
        assert!(matches!(result, Err(ImageError::Io(_))));
    }

    #[test]
    fn test_format_memory() {
        let mut mem = Memory::new();
        mem.load_image(&Image::from([(0x10, 0xBEEF)]));
        assert_eq!(format_memory(&mem), "; Mano image\n010 BEEF\n");
    }
}
