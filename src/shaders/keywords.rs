use std::fmt;

/// Set of preprocessor keywords selecting a program variant.
///
/// Small bitset so it can key the program cache directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderKeywords(u8);

impl ShaderKeywords {
    /// Gradient-based diffuse term in the display pass.
    pub const SHADING: Self = Self(1 << 0);
    /// In-shader 4-tap bilinear reconstruction for advection.
    pub const MANUAL_FILTERING: Self = Self(1 << 1);

    const NAMES: [(ShaderKeywords, &'static str); 2] = [
        (Self::SHADING, "SHADING"),
        (Self::MANUAL_FILTERING, "MANUAL_FILTERING"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(Self::SHADING.0 | Self::MANUAL_FILTERING.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Names to `#define` for this variant.
    pub fn defines(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl fmt::Debug for ShaderKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.defines()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_contains() {
        let mut keywords = ShaderKeywords::empty();
        assert!(keywords.is_empty());
        keywords.set(ShaderKeywords::MANUAL_FILTERING, true);
        assert!(keywords.contains(ShaderKeywords::MANUAL_FILTERING));
        assert!(!keywords.contains(ShaderKeywords::SHADING));
        assert_eq!(keywords.defines().collect::<Vec<_>>(), vec!["MANUAL_FILTERING"]);
        keywords.set(ShaderKeywords::MANUAL_FILTERING, false);
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_debug_lists_names() {
        assert_eq!(
            format!("{:?}", ShaderKeywords::all()),
            "{\"SHADING\", \"MANUAL_FILTERING\"}"
        );
    }
}
