use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView2};
use num_traits::{Bounded, NumCast, Zero};
use rayon::prelude::*;

use crate::error::LightmapError;
use crate::types::GridShape;

pub const FITS_BLOCK_SIZE: usize = 2880;
const FITS_CARD_SIZE: usize = 80;

const CHUNK: usize = 65536;
const PAR_THRESHOLD: usize = CHUNK * 2;

/// Keywords regenerated on write; never copied from a template header.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE",
    "BLANK", "PCOUNT", "GCOUNT", "XTENSION", "CHECKSUM", "DATASUM", "END",
];

/// Widest supported pixel, in bytes.
const MAX_PIXEL_BYTES: usize = 8;

/// One 80-character header card, stored as printable ASCII.
#[derive(Clone, Debug, PartialEq)]
pub struct Card(String);

impl Card {
    fn from_bytes(bytes: &[u8]) -> Self {
        let text: String = bytes
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { ' ' })
            .collect();
        Card(text)
    }

    fn formatted(keyword: &str, value: String, comment: Option<&str>) -> Self {
        let mut text = format!("{:<8}= {}", keyword, value);
        if let Some(comment) = comment {
            text.push_str(" / ");
            text.push_str(comment);
        }
        Card::padded(&text)
    }

    fn padded(text: &str) -> Self {
        let mut card = Card::from_bytes(text.as_bytes());
        card.0.truncate(FITS_CARD_SIZE);
        while card.0.len() < FITS_CARD_SIZE {
            card.0.push(' ');
        }
        card
    }

    pub fn int(keyword: &str, value: i64) -> Self {
        Card::formatted(keyword, format!("{:>20}", value), None)
    }

    pub fn float(keyword: &str, value: f64) -> Self {
        let text = if value.is_finite() && value == value.trunc() && value.abs() < 1e15 {
            format!("{:.1}", value)
        } else {
            format!("{:.16E}", value)
        };
        Card::formatted(keyword, format!("{:>20}", text), None)
    }

    pub fn logical(keyword: &str, value: bool) -> Self {
        Card::formatted(keyword, format!("{:>20}", if value { "T" } else { "F" }), None)
    }

    pub fn string(keyword: &str, value: &str) -> Self {
        let quoted = format!("'{:<8}'", value.replace('\'', "''"));
        Card::formatted(keyword, format!("{:<20}", quoted), None)
    }

    pub fn history(text: &str) -> Self {
        Card::padded(&format!("HISTORY {}", text))
    }

    fn end() -> Self {
        Card(format!("{:<80}", "END"))
    }

    pub fn keyword(&self) -> &str {
        self.0[..8.min(self.0.len())].trim_end()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn value_field(&self) -> Option<&str> {
        if self.0.len() >= 10 && &self.0[8..10] == "= " {
            Some(&self.0[10..])
        } else {
            None
        }
    }

    /// Value text with the comment stripped; `None` for commentary cards.
    fn raw_value(&self) -> Option<&str> {
        let field = self.value_field()?;
        let end = field.find('/').unwrap_or(field.len());
        let val = field[..end].trim();
        if val.is_empty() {
            None
        } else {
            Some(val)
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        let val = self.raw_value()?;
        val.trim_start_matches('+').parse().ok()
    }

    pub fn as_float(&self) -> Option<f64> {
        let val = self.raw_value()?;
        val.trim_start_matches('+').replace(['D', 'd'], "E").parse().ok()
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self.raw_value()? {
            "T" => Some(true),
            "F" => Some(false),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        let field = self.value_field()?.trim_start();
        let mut chars = field.strip_prefix('\'')?.chars().peekable();
        let mut out = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                } else {
                    return Some(out.trim_end().to_string());
                }
            } else {
                out.push(c);
            }
        }
        None
    }
}

/// Ordered FITS header. Lookups return the first card with a keyword.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Header { cards: Vec::new() }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn find(&self, keyword: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.keyword() == keyword)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.find(keyword).is_some()
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        self.find(keyword)?.as_int()
    }

    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        self.find(keyword)?.as_float()
    }

    pub fn get_string(&self, keyword: &str) -> Option<String> {
        self.find(keyword)?.as_string()
    }

    pub fn get_logical(&self, keyword: &str) -> Option<bool> {
        self.find(keyword)?.as_logical()
    }

    /// Replace the first card with the same keyword, or append.
    pub fn set(&mut self, card: Card) {
        match self.cards.iter_mut().find(|c| c.keyword() == card.keyword()) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn remove(&mut self, keyword: &str) {
        self.cards.retain(|c| c.keyword() != keyword);
    }

    pub fn with_int(mut self, keyword: &str, value: i64) -> Self {
        self.set(Card::int(keyword, value));
        self
    }

    pub fn with_float(mut self, keyword: &str, value: f64) -> Self {
        self.set(Card::float(keyword, value));
        self
    }

    pub fn with_string(mut self, keyword: &str, value: &str) -> Self {
        self.set(Card::string(keyword, value));
        self
    }

    fn axis(&self, axis: &'static str) -> Result<usize, LightmapError> {
        match self.get_int(axis) {
            Some(v) if v >= 1 => {
                usize::try_from(v).map_err(|_| LightmapError::Dimension { axis, value: v })
            }
            Some(v) => Err(LightmapError::Dimension { axis, value: v }),
            None => Err(LightmapError::Dimension { axis, value: 0 }),
        }
    }

    /// Grid dimensions from NAXIS1/NAXIS2.
    ///
    /// The pixel count, and its size at the widest BITPIX, must fit in `isize`.
    pub fn shape(&self) -> Result<GridShape, LightmapError> {
        let width = self.axis("NAXIS1")?;
        let height = self.axis("NAXIS2")?;
        let addressable = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(MAX_PIXEL_BYTES))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !addressable {
            return Err(LightmapError::Dimension {
                axis: "NAXIS2",
                value: height as i64,
            });
        }
        Ok(GridShape::new(width, height))
    }

    fn parse<R: Read>(reader: &mut R) -> Result<Header> {
        let mut header = Header::new();
        let mut block = [0u8; FITS_BLOCK_SIZE];
        let mut found_end = false;

        while !found_end {
            reader
                .read_exact(&mut block)
                .context("Failed to read FITS header block")?;

            for card_bytes in block.chunks_exact(FITS_CARD_SIZE) {
                let card = Card::from_bytes(card_bytes);
                if card.keyword() == "END" {
                    found_end = true;
                    break;
                }
                header.cards.push(card);
            }
        }

        if header.get_logical("SIMPLE") != Some(true) {
            bail!("Not a FITS primary header (SIMPLE = T missing)");
        }
        Ok(header)
    }

    /// Header for a new primary HDU: structural cards first, then every
    /// non-structural card of `self` in order.
    fn for_image(&self, shape: GridShape, bitpix: Bitpix) -> Header {
        let mut out = Header::new();
        out.push(Card::logical("SIMPLE", true));
        out.push(Card::int("BITPIX", bitpix.value()));
        out.push(Card::int("NAXIS", 2));
        out.push(Card::int("NAXIS1", shape.width as i64));
        out.push(Card::int("NAXIS2", shape.height as i64));
        for card in &self.cards {
            if !STRUCTURAL_KEYWORDS.contains(&card.keyword()) {
                out.push(card.clone());
            }
        }
        out
    }
}

/// On-disk pixel type of a FITS image.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            8 => Some(Bitpix::U8),
            16 => Some(Bitpix::I16),
            32 => Some(Bitpix::I32),
            64 => Some(Bitpix::I64),
            -32 => Some(Bitpix::F32),
            -64 => Some(Bitpix::F64),
            _ => None,
        }
    }

    pub fn value(self) -> i64 {
        match self {
            Bitpix::U8 => 8,
            Bitpix::I16 => 16,
            Bitpix::I32 => 32,
            Bitpix::I64 => 64,
            Bitpix::F32 => -32,
            Bitpix::F64 => -64,
        }
    }

    fn bytes(self) -> usize {
        (self.value().unsigned_abs() as usize) / 8
    }

    fn is_integer(self) -> bool {
        self.value() > 0
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE
}

fn decode_value(s: &[u8], bitpix: Bitpix) -> f64 {
    match bitpix {
        Bitpix::U8 => s[0] as f64,
        Bitpix::I16 => i16::from_be_bytes([s[0], s[1]]) as f64,
        Bitpix::I32 => i32::from_be_bytes([s[0], s[1], s[2], s[3]]) as f64,
        Bitpix::I64 => {
            i64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f64
        }
        Bitpix::F32 => f32::from_be_bytes([s[0], s[1], s[2], s[3]]) as f64,
        Bitpix::F64 => f64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]),
    }
}

fn saturate<T: NumCast + Bounded + Zero>(v: f64) -> T {
    if v.is_nan() {
        return T::zero();
    }
    <T as NumCast>::from(v.round()).unwrap_or_else(|| {
        if v > 0.0 {
            T::max_value()
        } else {
            T::min_value()
        }
    })
}

fn encode_value(v: f64, bitpix: Bitpix, d: &mut [u8]) {
    match bitpix {
        Bitpix::U8 => d[0] = saturate::<u8>(v),
        Bitpix::I16 => d.copy_from_slice(&saturate::<i16>(v).to_be_bytes()),
        Bitpix::I32 => d.copy_from_slice(&saturate::<i32>(v).to_be_bytes()),
        Bitpix::I64 => d.copy_from_slice(&saturate::<i64>(v).to_be_bytes()),
        Bitpix::F32 => d.copy_from_slice(&(v as f32).to_be_bytes()),
        Bitpix::F64 => d.copy_from_slice(&v.to_be_bytes()),
    }
}

/// Decode the primary data unit following `header`.
fn read_data<R: Read>(reader: &mut R, header: &Header) -> Result<Array2<f64>> {
    let bitpix_value = header
        .get_int("BITPIX")
        .context("Missing BITPIX keyword in FITS header")?;
    let bitpix = match Bitpix::from_value(bitpix_value) {
        Some(b) => b,
        None => bail!("Unsupported BITPIX value: {}", bitpix_value),
    };

    let naxis = header.get_int("NAXIS").unwrap_or(0);
    if naxis < 2 {
        bail!("FITS image must have at least 2 dimensions");
    }
    if naxis > 2 {
        if let Some(planes) = header.get_int("NAXIS3") {
            if planes > 1 {
                bail!("FITS image has {} planes, expected a single 2-D image", planes);
            }
        }
    }
    let shape = header.shape()?;

    let num_pixels = shape.len();
    let bytes_per_pixel = bitpix.bytes();
    let mut raw = vec![0u8; num_pixels * bytes_per_pixel];
    reader
        .read_exact(&mut raw)
        .context("Failed to read FITS data")?;

    let bzero = header.get_float("BZERO").unwrap_or(0.0);
    let bscale = header.get_float("BSCALE").unwrap_or(1.0);
    let blank = if bitpix.is_integer() {
        header.get_int("BLANK")
    } else {
        None
    };

    let convert = |s: &[u8], d: &mut [f64]| {
        for (i, out) in d.iter_mut().enumerate() {
            let off = i * bytes_per_pixel;
            let val = decode_value(&s[off..off + bytes_per_pixel], bitpix);
            *out = match blank {
                Some(b) if val == b as f64 => f64::NAN,
                _ => bzero + bscale * val,
            };
        }
    };

    let mut values = vec![0f64; num_pixels];
    if num_pixels >= PAR_THRESHOLD {
        raw.par_chunks(CHUNK * bytes_per_pixel)
            .zip(values.par_chunks_mut(CHUNK))
            .for_each(|(s, d)| convert(s, d));
    } else {
        convert(&raw, &mut values);
    }

    Array2::from_shape_vec(shape.dim(), values).context("Failed to reshape FITS data")
}

/// Read the primary header only.
pub fn read_fits_header(path: &Path) -> Result<Header> {
    let file = File::open(path).context("Failed to open FITS file")?;
    let mut reader = BufReader::new(file);
    Header::parse(&mut reader)
}

/// Read the primary header and its 2-D image as `(NAXIS2, NAXIS1)` f64 pixels.
pub fn read_fits_image(path: &Path) -> Result<(Header, Array2<f64>)> {
    let file = File::open(path).context("Failed to open FITS file")?;
    let mut reader = BufReader::new(file);
    let header = Header::parse(&mut reader)?;
    let data = read_data(&mut reader, &header)?;
    Ok((header, data))
}

/// Encode a primary HDU. Structural keywords come from `data` and `bitpix`;
/// the remaining cards of `template` are copied verbatim.
pub fn encode_fits<W: Write>(
    writer: &mut W,
    template: &Header,
    data: ArrayView2<f64>,
    bitpix: Bitpix,
) -> Result<()> {
    let (height, width) = data.dim();
    if width == 0 || height == 0 {
        bail!("Cannot write an empty {}x{} image", width, height);
    }
    let header = template.for_image(GridShape::new(width, height), bitpix);

    let mut head_bytes = Vec::with_capacity(padded_len((header.cards.len() + 1) * FITS_CARD_SIZE));
    for card in header.cards.iter().chain(std::iter::once(&Card::end())) {
        head_bytes.extend_from_slice(card.as_str().as_bytes());
    }
    head_bytes.resize(padded_len(head_bytes.len()), b' ');
    writer
        .write_all(&head_bytes)
        .context("Failed to write FITS header")?;

    let values: Vec<f64> = data.iter().copied().collect();
    let bytes_per_pixel = bitpix.bytes();
    let mut raw = vec![0u8; padded_len(values.len() * bytes_per_pixel)];

    let convert = |s: &[f64], d: &mut [u8]| {
        for (v, out) in s.iter().zip(d.chunks_exact_mut(bytes_per_pixel)) {
            encode_value(*v, bitpix, out);
        }
    };
    let data_len = values.len() * bytes_per_pixel;
    if values.len() >= PAR_THRESHOLD {
        values
            .par_chunks(CHUNK)
            .zip(raw[..data_len].par_chunks_mut(CHUNK * bytes_per_pixel))
            .for_each(|(s, d)| convert(s, d));
    } else {
        convert(&values, &mut raw[..data_len]);
    }

    writer.write_all(&raw).context("Failed to write FITS data")?;
    Ok(())
}
