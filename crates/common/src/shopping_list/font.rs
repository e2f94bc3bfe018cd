//! Embedded TrueType font for shopping list documents
//!
//! The fourteen standard PDF fonts only cover Latin-1, which loses every
//! Cyrillic ingredient name. Documents embed DejaVu Sans Mono instead and
//! write text as two-byte glyph ids (`Identity-H`), with a `ToUnicode` map
//! so viewers can copy and search the text.

use crate::errors::{AppError, Result};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");
const FONT_NAME: &str = "DejaVuSansMono";

/// Glyph space units per em in PDF
const PDF_UNITS: i64 = 1000;
/// FixedPitch | Nonsymbolic
const DESCRIPTOR_FLAGS: i64 = 1 | 32;
/// `ToUnicode` allows at most 100 entries per `bfchar` block
const BFCHAR_BLOCK: usize = 100;

fn malformed(what: impl std::fmt::Display) -> AppError {
    AppError::RenderFailed {
        message: format!("Embedded font is malformed: {}", what),
    }
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed(format!("read past end at {}", at)))
}

fn read_i16(data: &[u8], at: usize) -> Result<i16> {
    read_u16(data, at).map(|v| v as i16)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed(format!("read past end at {}", at)))
}

/// Offset of a table from the sfnt table directory
fn find_table(data: &[u8], tag: &[u8; 4]) -> Result<usize> {
    let count = read_u16(data, 4)? as usize;

    for index in 0..count {
        let record = 12 + index * 16;
        if data.get(record..record + 4) == Some(&tag[..]) {
            return Ok(read_u32(data, record + 8)? as usize);
        }
    }

    Err(malformed(format!(
        "missing '{}' table",
        String::from_utf8_lossy(tag)
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmapFormat {
    SegmentMapping,
    SegmentedCoverage,
}

/// The Unicode subtable of `cmap`; format 12 preferred since it covers
/// characters beyond the Basic Multilingual Plane
fn find_unicode_cmap(data: &[u8], cmap: usize) -> Result<(usize, CmapFormat)> {
    let count = read_u16(data, cmap + 2)?;
    let mut found = None;

    for index in 0..count as usize {
        let record = cmap + 4 + index * 8;
        let platform = read_u16(data, record)?;
        let encoding = read_u16(data, record + 2)?;
        let offset = cmap + read_u32(data, record + 4)? as usize;

        let unicode = platform == 0 || (platform == 3 && matches!(encoding, 1 | 10));
        if !unicode {
            continue;
        }

        match read_u16(data, offset)? {
            12 => return Ok((offset, CmapFormat::SegmentedCoverage)),
            4 if found.is_none() => found = Some((offset, CmapFormat::SegmentMapping)),
            _ => {}
        }
    }

    found.ok_or_else(|| malformed("no Unicode cmap subtable"))
}

/// Metrics and character map of the embedded font, parsed once
#[derive(Debug)]
pub struct EmbeddedFont {
    data: &'static [u8],
    units_per_em: u16,
    bbox: [i16; 4],
    ascent: i16,
    descent: i16,
    hmtx: usize,
    num_h_metrics: u16,
    cmap: usize,
    cmap_format: CmapFormat,
    /// Glyph used for characters the font does not have
    fallback: u16,
    /// `FontFile2` stream, compressed once
    file: Stream,
}

/// The font every shopping list is written in
pub fn shopping_list_font() -> Result<&'static EmbeddedFont> {
    static FONT: OnceLock<std::result::Result<EmbeddedFont, String>> = OnceLock::new();

    FONT.get_or_init(|| EmbeddedFont::parse(FONT_DATA).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|message| AppError::RenderFailed {
            message: message.clone(),
        })
}

impl EmbeddedFont {
    pub fn parse(data: &'static [u8]) -> Result<Self> {
        let head = find_table(data, b"head")?;
        let hhea = find_table(data, b"hhea")?;
        let hmtx = find_table(data, b"hmtx")?;
        let cmap_table = find_table(data, b"cmap")?;

        let units_per_em = read_u16(data, head + 18)?;
        if units_per_em == 0 {
            return Err(malformed("unitsPerEm is zero"));
        }

        let bbox = [
            read_i16(data, head + 36)?,
            read_i16(data, head + 38)?,
            read_i16(data, head + 40)?,
            read_i16(data, head + 42)?,
        ];

        let num_h_metrics = read_u16(data, hhea + 34)?;
        if num_h_metrics == 0 {
            return Err(malformed("no horizontal metrics"));
        }

        let (cmap, cmap_format) = find_unicode_cmap(data, cmap_table)?;

        let mut file = Stream::new(
            dictionary! { "Length1" => data.len() as i64 },
            data.to_vec(),
        );
        file.compress()
            .map_err(|e| malformed(format!("cannot compress font program: {}", e)))?;

        let mut font = Self {
            data,
            units_per_em,
            bbox,
            ascent: read_i16(data, hhea + 4)?,
            descent: read_i16(data, hhea + 6)?,
            hmtx,
            num_h_metrics,
            cmap,
            cmap_format,
            fallback: 0,
            file: file.with_compression(false),
        };
        font.fallback = font.lookup('?')?;

        Ok(font)
    }

    /// Glyph id for `c`, 0 (`.notdef`) when the font lacks it
    pub fn glyph_id(&self, c: char) -> u16 {
        self.lookup(c).unwrap_or(0)
    }

    fn lookup(&self, c: char) -> Result<u16> {
        match self.cmap_format {
            CmapFormat::SegmentedCoverage => self.lookup_format12(c as u32),
            CmapFormat::SegmentMapping => match u16::try_from(c as u32) {
                Ok(code) => self.lookup_format4(code),
                Err(_) => Ok(0),
            },
        }
    }

    fn lookup_format12(&self, code: u32) -> Result<u16> {
        let groups = read_u32(self.data, self.cmap + 12)? as usize;

        for index in 0..groups {
            let group = self.cmap + 16 + index * 12;
            let start = read_u32(self.data, group)?;
            let end = read_u32(self.data, group + 4)?;
            if code < start {
                break;
            }
            if code <= end {
                let glyph = read_u32(self.data, group + 8)? + (code - start);
                return Ok(u16::try_from(glyph).unwrap_or(0));
            }
        }

        Ok(0)
    }

    fn lookup_format4(&self, code: u16) -> Result<u16> {
        let seg_x2 = read_u16(self.data, self.cmap + 6)? as usize;
        let ends = self.cmap + 14;
        let starts = ends + seg_x2 + 2;
        let deltas = starts + seg_x2;
        let range_offsets = deltas + seg_x2;

        for index in 0..seg_x2 / 2 {
            let end = read_u16(self.data, ends + index * 2)?;
            if code > end {
                continue;
            }

            let start = read_u16(self.data, starts + index * 2)?;
            if code < start {
                return Ok(0);
            }

            let delta = read_u16(self.data, deltas + index * 2)?;
            let range_at = range_offsets + index * 2;
            let range_offset = read_u16(self.data, range_at)? as usize;

            if range_offset == 0 {
                return Ok(code.wrapping_add(delta));
            }

            let glyph_at = range_at + range_offset + (code - start) as usize * 2;
            let glyph = read_u16(self.data, glyph_at)?;
            return Ok(if glyph == 0 { 0 } else { glyph.wrapping_add(delta) });
        }

        Ok(0)
    }

    /// Advance width of a glyph in PDF glyph units
    pub fn advance(&self, glyph: u16) -> i64 {
        // Glyphs past the last long metric share its advance
        let index = glyph.min(self.num_h_metrics - 1) as usize;
        let raw = read_u16(self.data, self.hmtx + index * 4).unwrap_or(0);
        self.scale(raw as i64)
    }

    fn scale(&self, value: i64) -> i64 {
        value * PDF_UNITS / i64::from(self.units_per_em)
    }
}

/// Encodes text for one document and remembers which glyphs it used
pub struct TextEncoder<'a> {
    font: &'a EmbeddedFont,
    used: BTreeMap<u16, char>,
}

impl<'a> TextEncoder<'a> {
    pub fn new(font: &'a EmbeddedFont) -> Self {
        Self {
            font,
            used: BTreeMap::new(),
        }
    }

    /// A string operand for `Tj`. Characters missing from the font print as `?`.
    pub fn encode(&mut self, text: &str) -> Object {
        let mut bytes = Vec::with_capacity(text.len() * 2);

        for c in text.chars() {
            let (glyph, shown) = match self.font.glyph_id(c) {
                0 => (self.font.fallback, '?'),
                glyph => (glyph, c),
            };
            self.used.entry(glyph).or_insert(shown);
            bytes.extend_from_slice(&glyph.to_be_bytes());
        }

        Object::String(bytes, StringFormat::Hexadecimal)
    }

    /// Add the font objects to `doc` and return the `Type0` font to
    /// reference from page resources
    pub fn finish(self, doc: &mut Document) -> ObjectId {
        let font = self.font;

        let file_id = doc.add_object(font.file.clone());

        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => FONT_NAME,
            "Flags" => DESCRIPTOR_FLAGS,
            "FontBBox" => font.bbox.iter().map(|&v| Object::Integer(font.scale(v as i64))).collect::<Vec<_>>(),
            "ItalicAngle" => 0i64,
            "Ascent" => font.scale(font.ascent as i64),
            "Descent" => font.scale(font.descent as i64),
            "CapHeight" => font.scale(font.ascent as i64),
            "StemV" => 80i64,
            "FontFile2" => file_id,
        });

        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &glyph in self.used.keys() {
            widths.push(Object::Integer(glyph as i64));
            widths.push(Object::Array(vec![Object::Integer(font.advance(glyph))]));
        }

        let descendant_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => FONT_NAME,
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0i64,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => PDF_UNITS,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(&self.used)));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => FONT_NAME,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    let entries: Vec<(&u16, &char)> = used.iter().collect();
    for block in entries.chunks(BFCHAR_BLOCK) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph, c) in block {
            let mut units = [0u16; 2];
            let target: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", glyph, target));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );

    cmap.into_bytes()
}
