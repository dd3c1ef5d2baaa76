//! Solver configuration: the recognized option set, selection enums for the
//! strategy slots, and `key = value` settings-file persistence.
//!
//! The batch driver dumps the defaults to `default.set` at startup and
//! consumes an optional `pivoters.set` override; the same format round-trips
//! through [`Settings::parse`] and [`Settings::write_to`].

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::{E, INFTY};

#[derive(Debug, Display, Error, PartialEq)]
pub enum SettingsError {
    #[display("unknown option '{name}'")]
    UnknownOption { name: String },
    #[display("invalid value '{value}' for option '{name}'")]
    InvalidValue { name: String, value: String },
    #[display("settings file error at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[display("settings i/o error: {message}")]
    Io { message: String },
}

macro_rules! option_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let txt = match self {
                    $($name::$variant => $text),+
                };
                write!(f, "{}", txt)
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

option_enum!(
    /// Which side of the pivot drives an iteration: entering (primal) or
    /// leaving (dual).
    Algorithm {
        Enter => "enter",
        Leave => "leave",
    }
);

option_enum!(
    /// Problem representation the engine pivots in.
    Representation {
        Row => "row",
        Column => "column",
    }
);

option_enum!(
    /// Basis factorization update method.
    FactorUpdate {
        Eta => "eta",
        ForestTomlin => "forest_tomlin",
    }
);

option_enum!(
    /// Pricing strategy.
    PricerSelection {
        Dantzig => "dantzig",
        ParMult => "parmult",
        Devex => "devex",
        Hybrid => "hybrid",
        Steep => "steep",
        SteepQuick => "steep_quick",
        Auto => "auto",
    }
);

option_enum!(
    /// Ratio-test strategy.
    RatioTesterSelection {
        Textbook => "textbook",
        Harris => "harris",
        Fast => "fast",
        BoundFlipping => "boundflipping",
    }
);

option_enum!(
    /// LP scaling strategy.
    ScalerSelection {
        Off => "off",
        UniEqui => "uniequi",
        BiEqui => "biequi",
        Geo1 => "geo1",
        Geo8 => "geo8",
    }
);

option_enum!(
    /// Starting-basis strategy.
    StarterSelection {
        Off => "off",
        Weight => "weight",
        Sum => "sum",
        Vector => "vector",
    }
);

option_enum!(
    /// Presolve collaborator selection.
    SimplifierSelection {
        Off => "off",
        Main => "main",
    }
);

option_enum!(
    /// Objective sense used when a file format does not carry one.
    ObjSense {
        Minimize => "minimize",
        Maximize => "maximize",
    }
);

impl PricerSelection {
    /// Maps a numeric selector to a pricer. Selector 0 and any value beyond
    /// the defined range select `Auto`.
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => PricerSelection::Dantzig,
            2 => PricerSelection::ParMult,
            3 => PricerSelection::Devex,
            4 => PricerSelection::Hybrid,
            5 => PricerSelection::Steep,
            6 => PricerSelection::SteepQuick,
            _ => PricerSelection::Auto,
        }
    }
}

impl RatioTesterSelection {
    /// Maps a numeric selector to a ratio tester; 0 and out-of-range values
    /// select the textbook tester.
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => RatioTesterSelection::Harris,
            2 => RatioTesterSelection::Fast,
            3 => RatioTesterSelection::BoundFlipping,
            _ => RatioTesterSelection::Textbook,
        }
    }
}

impl ScalerSelection {
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => ScalerSelection::UniEqui,
            2 => ScalerSelection::BiEqui,
            3 => ScalerSelection::Geo1,
            4 => ScalerSelection::Geo8,
            _ => ScalerSelection::Off,
        }
    }
}

impl StarterSelection {
    /// Maps a numeric selector to a starter; 0 and out-of-range values
    /// select `Off`.
    pub fn from_code(code: usize) -> Self {
        match code {
            1 => StarterSelection::Weight,
            2 => StarterSelection::Sum,
            3 => StarterSelection::Vector,
            _ => StarterSelection::Off,
        }
    }
}

/// The recognized solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub algorithm: Algorithm,
    pub representation: Representation,
    pub factor_update: FactorUpdate,
    pub pricer: PricerSelection,
    pub ratiotester: RatioTesterSelection,
    pub scaler: ScalerSelection,
    pub starter: StarterSelection,
    pub simplifier: SimplifierSelection,
    pub objsense: ObjSense,

    /// Target primal feasibility tolerance reported to the caller.
    pub feastol: E,
    /// Target dual feasibility tolerance reported to the caller.
    pub opttol: E,
    /// Working floating-point feasibility tolerance of the engine.
    pub fp_feastol: E,
    /// Working floating-point optimality tolerance of the engine.
    pub fp_opttol: E,
    /// Magnitudes below this are treated as zero.
    pub epsilon_zero: E,
    /// Pivot acceptance threshold during refactorization.
    pub epsilon_factorization: E,
    /// Pivot acceptance threshold for factorization updates.
    pub epsilon_update: E,

    /// Wall-clock limit in seconds; negative disables.
    pub time_limit: E,
    /// Iteration limit; negative disables.
    pub iter_limit: i64,
    /// Abort once the objective crosses this value in the direction of
    /// optimization; magnitudes at or above the infinity sentinel disable it.
    pub objval_limit: E,
    pub partial_pricing: bool,

    /// Maximum factorization updates between refactorizations.
    pub factor_update_max: usize,
    /// Refactorize when the basic-solution residual exceeds this.
    pub refactor_tol: E,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Leave,
            representation: Representation::Column,
            factor_update: FactorUpdate::ForestTomlin,
            pricer: PricerSelection::Auto,
            ratiotester: RatioTesterSelection::Fast,
            scaler: ScalerSelection::BiEqui,
            starter: StarterSelection::Off,
            simplifier: SimplifierSelection::Off,
            objsense: ObjSense::Minimize,
            feastol: 1e-6,
            opttol: 1e-6,
            fp_feastol: 1e-6,
            fp_opttol: 1e-6,
            epsilon_zero: 1e-16,
            epsilon_factorization: 1e-20,
            epsilon_update: 1e-16,
            time_limit: -1.,
            iter_limit: -1,
            objval_limit: INFTY,
            partial_pricing: false,
            factor_update_max: 200,
            refactor_tol: 1e-6,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a single option from its textual value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();
        match name {
            "algorithm" => self.algorithm = value.parse().map_err(|_| invalid())?,
            "representation" => self.representation = value.parse().map_err(|_| invalid())?,
            "factor_update" => self.factor_update = value.parse().map_err(|_| invalid())?,
            "pricer" => self.pricer = value.parse().map_err(|_| invalid())?,
            "ratiotester" => self.ratiotester = value.parse().map_err(|_| invalid())?,
            "scaler" => self.scaler = value.parse().map_err(|_| invalid())?,
            "starter" => self.starter = value.parse().map_err(|_| invalid())?,
            "simplifier" => self.simplifier = value.parse().map_err(|_| invalid())?,
            "objsense" => self.objsense = value.parse().map_err(|_| invalid())?,
            "feastol" => self.feastol = value.parse().map_err(|_| invalid())?,
            "opttol" => self.opttol = value.parse().map_err(|_| invalid())?,
            "fp_feastol" => self.fp_feastol = value.parse().map_err(|_| invalid())?,
            "fp_opttol" => self.fp_opttol = value.parse().map_err(|_| invalid())?,
            "epsilon_zero" => self.epsilon_zero = value.parse().map_err(|_| invalid())?,
            "epsilon_factorization" => {
                self.epsilon_factorization = value.parse().map_err(|_| invalid())?
            }
            "epsilon_update" => self.epsilon_update = value.parse().map_err(|_| invalid())?,
            "time_limit" => self.time_limit = value.parse().map_err(|_| invalid())?,
            "iter_limit" => self.iter_limit = value.parse().map_err(|_| invalid())?,
            "objval_limit" => self.objval_limit = value.parse().map_err(|_| invalid())?,
            "partial_pricing" => self.partial_pricing = value.parse().map_err(|_| invalid())?,
            "factor_update_max" => {
                self.factor_update_max = value.parse().map_err(|_| invalid())?
            }
            "refactor_tol" => self.refactor_tol = value.parse().map_err(|_| invalid())?,
            _ => {
                return Err(SettingsError::UnknownOption {
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Parses a `key = value` settings dump. Blank lines and `#` comments are
    /// skipped; unknown keys and malformed lines are reported with their line
    /// number.
    pub fn parse(&mut self, text: &str) -> Result<(), SettingsError> {
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(SettingsError::Malformed {
                line: lineno + 1,
                message: "expected 'key = value'".to_string(),
            })?;
            self.set(key.trim(), value.trim())
                .map_err(|e| SettingsError::Malformed {
                    line: lineno + 1,
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Writes the full option set as `key = value` lines.
    pub fn write_to<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "algorithm = {}", self.algorithm)?;
        writeln!(out, "representation = {}", self.representation)?;
        writeln!(out, "factor_update = {}", self.factor_update)?;
        writeln!(out, "pricer = {}", self.pricer)?;
        writeln!(out, "ratiotester = {}", self.ratiotester)?;
        writeln!(out, "scaler = {}", self.scaler)?;
        writeln!(out, "starter = {}", self.starter)?;
        writeln!(out, "simplifier = {}", self.simplifier)?;
        writeln!(out, "objsense = {}", self.objsense)?;
        writeln!(out, "feastol = {:e}", self.feastol)?;
        writeln!(out, "opttol = {:e}", self.opttol)?;
        writeln!(out, "fp_feastol = {:e}", self.fp_feastol)?;
        writeln!(out, "fp_opttol = {:e}", self.fp_opttol)?;
        writeln!(out, "epsilon_zero = {:e}", self.epsilon_zero)?;
        writeln!(out, "epsilon_factorization = {:e}", self.epsilon_factorization)?;
        writeln!(out, "epsilon_update = {:e}", self.epsilon_update)?;
        writeln!(out, "time_limit = {}", self.time_limit)?;
        writeln!(out, "iter_limit = {}", self.iter_limit)?;
        writeln!(out, "objval_limit = {:e}", self.objval_limit)?;
        writeln!(out, "partial_pricing = {}", self.partial_pricing)?;
        writeln!(out, "factor_update_max = {}", self.factor_update_max)?;
        writeln!(out, "refactor_tol = {:e}", self.refactor_tol)?;
        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<(), SettingsError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).map_err(|e| SettingsError::Io {
            message: e.to_string(),
        })?;
        std::fs::write(path, buf).map_err(|e| SettingsError::Io {
            message: e.to_string(),
        })
    }

    pub fn load(path: &str) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            message: e.to_string(),
        })?;
        let mut settings = Settings::default();
        settings.parse(&text)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut s = Settings::default();
        s.algorithm = Algorithm::Enter;
        s.pricer = PricerSelection::Steep;
        s.feastol = 1e-8;
        s.iter_limit = 1000;

        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut parsed = Settings::default();
        parsed.parse(&text).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn test_unknown_option() {
        let mut s = Settings::default();
        let err = s.set("no_such_option", "1").unwrap_err();
        assert_eq!(
            err,
            SettingsError::UnknownOption {
                name: "no_such_option".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_value_reports_line() {
        let mut s = Settings::default();
        let err = s.parse("algorithm = leave\npricer = bogus\n").unwrap_err();
        match err {
            SettingsError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_selector_codes() {
        assert_eq!(PricerSelection::from_code(0), PricerSelection::Auto);
        assert_eq!(PricerSelection::from_code(5), PricerSelection::Steep);
        assert_eq!(PricerSelection::from_code(9), PricerSelection::Auto);
        assert_eq!(
            RatioTesterSelection::from_code(0),
            RatioTesterSelection::Textbook
        );
        assert_eq!(
            RatioTesterSelection::from_code(3),
            RatioTesterSelection::BoundFlipping
        );
    }
}
