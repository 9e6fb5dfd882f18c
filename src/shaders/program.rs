use super::keywords::ShaderKeywords;

/// Every GPU program the engine draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKind {
    Copy,
    Clear,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Display,
    DisplayMask,
}

/// Where a program's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOutput {
    /// Offscreen simulation field.
    Field,
    /// The visible surface.
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Replace,
    /// `ONE, ONE_MINUS_SRC_ALPHA`
    Premultiplied,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 11] = [
        ProgramKind::Copy,
        ProgramKind::Clear,
        ProgramKind::Splat,
        ProgramKind::Advection,
        ProgramKind::Divergence,
        ProgramKind::Curl,
        ProgramKind::Vorticity,
        ProgramKind::Pressure,
        ProgramKind::GradientSubtract,
        ProgramKind::Display,
        ProgramKind::DisplayMask,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Copy => "copy",
            ProgramKind::Clear => "clear",
            ProgramKind::Splat => "splat",
            ProgramKind::Advection => "advection",
            ProgramKind::Divergence => "divergence",
            ProgramKind::Curl => "curl",
            ProgramKind::Vorticity => "vorticity",
            ProgramKind::Pressure => "pressure",
            ProgramKind::GradientSubtract => "gradient_subtract",
            ProgramKind::Display => "display",
            ProgramKind::DisplayMask => "display_mask",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            ProgramKind::Copy => include_str!("wgsl/copy.wgsl"),
            ProgramKind::Clear => include_str!("wgsl/clear.wgsl"),
            ProgramKind::Splat => include_str!("wgsl/splat.wgsl"),
            ProgramKind::Advection => include_str!("wgsl/advection.wgsl"),
            ProgramKind::Divergence => include_str!("wgsl/divergence.wgsl"),
            ProgramKind::Curl => include_str!("wgsl/curl.wgsl"),
            ProgramKind::Vorticity => include_str!("wgsl/vorticity.wgsl"),
            ProgramKind::Pressure => include_str!("wgsl/pressure.wgsl"),
            ProgramKind::GradientSubtract => include_str!("wgsl/gradient_subtract.wgsl"),
            ProgramKind::Display => include_str!("wgsl/display.wgsl"),
            ProgramKind::DisplayMask => include_str!("wgsl/display_mask.wgsl"),
        }
    }

    /// Keywords that change this program's code. Others are ignored when
    /// looking up a variant so they never create duplicate cache entries.
    pub fn supported_keywords(self) -> ShaderKeywords {
        match self {
            ProgramKind::Advection => ShaderKeywords::MANUAL_FILTERING,
            ProgramKind::Display => ShaderKeywords::SHADING,
            _ => ShaderKeywords::empty(),
        }
    }

    pub fn output(self) -> ProgramOutput {
        match self {
            ProgramKind::Display | ProgramKind::DisplayMask => ProgramOutput::Surface,
            _ => ProgramOutput::Field,
        }
    }

    pub fn blend(self) -> BlendMode {
        match self.output() {
            ProgramOutput::Surface => BlendMode::Premultiplied,
            ProgramOutput::Field => BlendMode::Replace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_program_has_entry_points() {
        for kind in ProgramKind::ALL {
            let source = kind.source();
            assert!(source.contains("fn fs_main"), "{} lacks fs_main", kind.name());
            assert!(
                source.contains("#include \"common.wgsl\""),
                "{} lacks common include",
                kind.name()
            );
        }
    }

    #[test]
    fn test_solver_limits_come_from_uniforms() {
        let source = ProgramKind::Vorticity.source();
        assert!(source.contains("params.curl_epsilon"));
        assert!(source.contains("params.velocity_limit"));
        for kind in ProgramKind::ALL {
            assert!(
                !kind.source().contains("const "),
                "{} declares a literal constant",
                kind.name()
            );
        }
    }

    #[test]
    fn test_only_display_programs_blend() {
        for kind in ProgramKind::ALL {
            let blends = kind.blend() == BlendMode::Premultiplied;
            assert_eq!(blends, kind.output() == ProgramOutput::Surface);
        }
    }
}
