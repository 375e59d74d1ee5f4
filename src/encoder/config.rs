/// Encoder-Konfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Zeilen-/Positions-Records hinter Debug-relevanten Records schreiben.
    pub debug_info: bool,
    /// Known-Type-Lookups ignorieren die Component-Identität.
    pub compile_only: bool,
    /// Dictionary-Inhalte als Deferred Content (Keys vor Werten) schreiben.
    pub defer_dictionaries: bool,
    /// Eingebaute Extensions mit einfachem Argument skalar kodieren.
    pub optimize_extensions: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { debug_info: false, compile_only: false, defer_dictionaries: true, optimize_extensions: true }
    }
}

impl EncoderConfig {
    /// Konfiguration mit Debug-Zeileninformation.
    pub fn with_debug_info(mut self) -> Self {
        self.debug_info = true;
        self
    }

    pub fn compile_only(mut self) -> Self {
        self.compile_only = true;
        self
    }

    /// Dictionaries inline schreiben, Keys als normale `x:Key`-Attribute.
    pub fn without_deferral(mut self) -> Self {
        self.defer_dictionaries = false;
        self
    }

    pub fn without_extension_optimization(mut self) -> Self {
        self.optimize_extensions = false;
        self
    }
}
