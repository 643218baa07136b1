use thiserror::Error;

/// Ten-step ramp used unless the user picks another one.
pub const STANDARD_RAMP: &str = " .:-=+*#%@";

/// Coarse ramp for tiny grids.
pub const MINIMAL_RAMP: &str = " .:#";

/// Paul Bourke's 70-level ramp, reversed to run dark to light.
pub const DENSE_RAMP: &str =
    " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RampError {
    #[error("glyph ramp must contain at least two glyphs")]
    TooShort,
    #[error("glyph ramp may only contain printable ASCII, found {0:?}")]
    NotPrintable(char),
}

/// Glyphs ordered from darkest to lightest, one byte each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: Vec<u8>,
}

impl GlyphRamp {
    pub fn new(glyphs: &str) -> Result<Self, RampError> {
        if let Some(bad) = glyphs.chars().find(|c| !(' '..='~').contains(c)) {
            return Err(RampError::NotPrintable(bad));
        }
        if glyphs.len() < 2 || glyphs.len() > 256 {
            return Err(RampError::TooShort);
        }

        Ok(Self {
            glyphs: glyphs.as_bytes().to_vec(),
        })
    }

    pub fn standard() -> Self {
        Self {
            glyphs: STANDARD_RAMP.as_bytes().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Bucket index for a luminance value: `floor(L / (256 / n))`.
    pub fn bucket(&self, luminance: u8) -> usize {
        luminance as usize * self.glyphs.len() / 256
    }

    pub fn glyph(&self, luminance: u8) -> u8 {
        self.glyphs[self.bucket(luminance)]
    }

    pub fn darkest(&self) -> u8 {
        self.glyphs[0]
    }

    pub fn lightest(&self) -> u8 {
        self.glyphs[self.glyphs.len() - 1]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.glyphs
    }
}

impl Default for GlyphRamp {
    fn default() -> Self {
        Self::standard()
    }
}
