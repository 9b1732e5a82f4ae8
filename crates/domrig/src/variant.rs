//! Run axes of a fixture.

/// One parameterisation of a fixture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Client-side render into an empty target
    Normal,
    /// Compiled with `hydratable` and mounted with `hydrate: true`
    Hydratable,
    /// The single implicit variant of the custom-element suite
    CustomElement,
}

impl Variant {
    /// The two variants of the runtime suite, in execution order.
    pub const RUNTIME: [Variant; 2] = [Variant::Normal, Variant::Hydratable];

    pub fn is_hydrate(self) -> bool {
        matches!(self, Variant::Hydratable)
    }

    /// Directory name under `_output/` for compiled artifacts.
    pub fn output_dir(self) -> &'static str {
        match self {
            Variant::Normal => "normal",
            Variant::Hydratable => "hydratable",
            Variant::CustomElement => "custom-element",
        }
    }

    /// Test name shown by the reporter.
    pub fn test_name(self, fixture: &str) -> String {
        match self {
            Variant::Hydratable => format!("{} (with hydration)", fixture),
            Variant::Normal | Variant::CustomElement => fixture.to_string(),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.output_dir())
    }
}
