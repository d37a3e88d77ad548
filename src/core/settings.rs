//! Inference parameters sent with every generation request.
//!
//! The live settings object is only ever replaced by a copy that has passed
//! [`InferenceSettings::with_field`], so it always satisfies every per-field
//! domain. [`SettingsValidator::merge`] is the one unchecked path and must only
//! be fed values that are already known to be valid.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SettingField {
    Temperature,
    TopK,
    TopP,
    MinP,
    NPredict,
    NKeep,
    Stream,
    TfsZ,
    TypicalP,
    RepeatPenalty,
    RepeatLastN,
    PenalizeNl,
    PresencePenalty,
    FrequencyPenalty,
    Mirostat,
    MirostatTau,
    MirostatEta,
    Seed,
    IgnoreEos,
    CachePrompt,
}

impl SettingField {
    pub const ALL: [SettingField; 20] = [
        SettingField::Temperature,
        SettingField::TopK,
        SettingField::TopP,
        SettingField::MinP,
        SettingField::NPredict,
        SettingField::NKeep,
        SettingField::Stream,
        SettingField::TfsZ,
        SettingField::TypicalP,
        SettingField::RepeatPenalty,
        SettingField::RepeatLastN,
        SettingField::PenalizeNl,
        SettingField::PresencePenalty,
        SettingField::FrequencyPenalty,
        SettingField::Mirostat,
        SettingField::MirostatTau,
        SettingField::MirostatEta,
        SettingField::Seed,
        SettingField::IgnoreEos,
        SettingField::CachePrompt,
    ];

    /// Wire name of the field, as it appears in the request body.
    pub fn name(self) -> &'static str {
        match self {
            SettingField::Temperature => "temperature",
            SettingField::TopK => "top_k",
            SettingField::TopP => "top_p",
            SettingField::MinP => "min_p",
            SettingField::NPredict => "n_predict",
            SettingField::NKeep => "n_keep",
            SettingField::Stream => "stream",
            SettingField::TfsZ => "tfs_z",
            SettingField::TypicalP => "typical_p",
            SettingField::RepeatPenalty => "repeat_penalty",
            SettingField::RepeatLastN => "repeat_last_n",
            SettingField::PenalizeNl => "penalize_nl",
            SettingField::PresencePenalty => "presence_penalty",
            SettingField::FrequencyPenalty => "frequency_penalty",
            SettingField::Mirostat => "mirostat",
            SettingField::MirostatTau => "mirostat_tau",
            SettingField::MirostatEta => "mirostat_eta",
            SettingField::Seed => "seed",
            SettingField::IgnoreEos => "ignore_eos",
            SettingField::CachePrompt => "cache_prompt",
        }
    }

    pub fn domain(self) -> FieldDomain {
        use FieldDomain::{Bool, Integer, Real};
        match self {
            SettingField::Temperature => Real {
                min: 0.0,
                max: 1.0,
                step: 0.1,
            },
            SettingField::TopK => Integer { min: 0, max: 100 },
            SettingField::TopP | SettingField::MinP | SettingField::TypicalP => Real {
                min: 0.0,
                max: 1.0,
                step: 0.01,
            },
            SettingField::NPredict => Integer { min: -1, max: 2048 },
            SettingField::NKeep | SettingField::RepeatLastN => Integer { min: 0, max: 2048 },
            SettingField::TfsZ => Real {
                min: 0.0,
                max: 2.0,
                step: 0.1,
            },
            SettingField::RepeatPenalty => Real {
                min: 1.0,
                max: 2.0,
                step: 0.1,
            },
            SettingField::PresencePenalty | SettingField::FrequencyPenalty => Real {
                min: 0.0,
                max: 2.0,
                step: 0.1,
            },
            SettingField::Mirostat => Integer { min: 0, max: 2 },
            SettingField::MirostatTau => Real {
                min: 0.0,
                max: 10.0,
                step: 0.1,
            },
            SettingField::MirostatEta => Real {
                min: 0.0,
                max: 1.0,
                step: 0.01,
            },
            SettingField::Seed => Integer {
                min: -1,
                max: 1_000_000,
            },
            SettingField::Stream
            | SettingField::PenalizeNl
            | SettingField::IgnoreEos
            | SettingField::CachePrompt => Bool,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.name() == normalized)
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingField {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| SettingsError::UnknownField(s.to_string()))
    }
}

impl TryFrom<String> for SettingField {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SettingField> for String {
    fn from(value: SettingField) -> Self {
        value.name().to_string()
    }
}

/// Declared type and inclusive range of a setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDomain {
    /// Real-valued field. `step` is the UI granularity and is not enforced.
    Real { min: f64, max: f64, step: f64 },
    /// Integer field; the step is always 1.
    Integer { min: i64, max: i64 },
    Bool,
}

impl FieldDomain {
    /// Checks type and range, returning the value in the domain's native type.
    pub fn check(self, field: SettingField, value: SettingValue) -> Result<SettingValue, SettingsError> {
        let mismatch = || SettingsError::TypeMismatch {
            field,
            value,
            expected: self,
        };
        let out_of_range = || SettingsError::OutOfRange {
            field,
            value,
            domain: self,
        };

        match self {
            FieldDomain::Bool => match value {
                SettingValue::Bool(flag) => Ok(SettingValue::Bool(flag)),
                _ => Err(mismatch()),
            },
            FieldDomain::Real { min, max, .. } => {
                let number = match value {
                    SettingValue::Real(number) => number,
                    SettingValue::Integer(number) => number as f64,
                    SettingValue::Bool(_) => return Err(mismatch()),
                };
                if !number.is_finite() {
                    return Err(mismatch());
                }
                if number < min || number > max {
                    return Err(out_of_range());
                }
                Ok(SettingValue::Real(number))
            }
            FieldDomain::Integer { min, max } => {
                let number = match value {
                    SettingValue::Integer(number) => number,
                    SettingValue::Real(number) if number.is_finite() && number.fract() == 0.0 => {
                        number as i64
                    }
                    _ => return Err(mismatch()),
                };
                if number < min || number > max {
                    return Err(out_of_range());
                }
                Ok(SettingValue::Integer(number))
            }
        }
    }
}

impl fmt::Display for FieldDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDomain::Real { min, max, step } => write!(f, "[{min}, {max}] step {step}"),
            FieldDomain::Integer { min, max } => write!(f, "[{min}, {max}] step 1"),
            FieldDomain::Bool => f.write_str("true | false"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
}

impl SettingValue {
    /// Parses user input according to the field's declared type.
    pub fn parse_for(field: SettingField, input: &str) -> Result<Self, SettingsError> {
        let trimmed = input.trim();
        let invalid = || SettingsError::InvalidValue {
            field,
            input: trimmed.to_string(),
        };

        match field.domain() {
            FieldDomain::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => Ok(SettingValue::Bool(true)),
                "off" | "false" | "no" | "0" => Ok(SettingValue::Bool(false)),
                _ => Err(invalid()),
            },
            FieldDomain::Integer { .. } => trimmed
                .parse::<i64>()
                .map(SettingValue::Integer)
                .or_else(|_| trimmed.parse::<f64>().map(SettingValue::Real))
                .map_err(|_| invalid()),
            FieldDomain::Real { .. } => trimmed
                .parse::<f64>()
                .map(SettingValue::Real)
                .map_err(|_| invalid()),
        }
    }

    fn real(self) -> f64 {
        match self {
            SettingValue::Real(number) => number,
            SettingValue::Integer(number) => number as f64,
            SettingValue::Bool(flag) => f64::from(u8::from(flag)),
        }
    }

    fn integer(self) -> i64 {
        match self {
            SettingValue::Integer(number) => number,
            SettingValue::Real(number) => number as i64,
            SettingValue::Bool(flag) => i64::from(flag),
        }
    }

    fn flag(self) -> bool {
        match self {
            SettingValue::Bool(flag) => flag,
            SettingValue::Integer(number) => number != 0,
            SettingValue::Real(number) => number != 0.0,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(flag) => write!(f, "{flag}"),
            SettingValue::Integer(number) => write!(f, "{number}"),
            SettingValue::Real(number) => write!(f, "{number}"),
        }
    }
}

/// Default sets shipped with the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsProfile {
    /// Chat client defaults: temperature 0.7, prompt cache off.
    #[default]
    Chat,
    /// The generation service's own defaults: temperature 0.8, prompt cache on.
    Server,
}

impl SettingsProfile {
    /// Fields the profile changes relative to the chat defaults.
    pub fn overrides(self) -> PartialSettings {
        match self {
            SettingsProfile::Chat => PartialSettings::new(),
            SettingsProfile::Server => PartialSettings::new()
                .with(SettingField::Temperature, SettingValue::Real(0.8))
                .with(SettingField::CachePrompt, SettingValue::Bool(true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub temperature: f64,
    pub top_k: i64,
    pub top_p: f64,
    pub min_p: f64,
    pub n_predict: i64,
    pub n_keep: i64,
    pub stream: bool,
    pub tfs_z: f64,
    pub typical_p: f64,
    pub repeat_penalty: f64,
    pub repeat_last_n: i64,
    pub penalize_nl: bool,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub mirostat: i64,
    pub mirostat_tau: f64,
    pub mirostat_eta: f64,
    pub seed: i64,
    pub ignore_eos: bool,
    pub cache_prompt: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self::for_profile(SettingsProfile::default())
    }
}

impl InferenceSettings {
    /// The profile's overrides merged onto the chat defaults. Profile values
    /// are constants that lie inside their domains, so no validation runs.
    pub fn for_profile(profile: SettingsProfile) -> Self {
        SettingsValidator::new(Self::chat_defaults()).merge(&profile.overrides())
    }

    fn chat_defaults() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            min_p: 0.05,
            n_predict: -1,
            n_keep: 0,
            stream: true,
            tfs_z: 1.0,
            typical_p: 1.0,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            penalize_nl: true,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            seed: -1,
            ignore_eos: false,
            cache_prompt: false,
        }
    }

    pub fn get(&self, field: SettingField) -> SettingValue {
        use SettingValue::{Bool, Integer, Real};
        match field {
            SettingField::Temperature => Real(self.temperature),
            SettingField::TopK => Integer(self.top_k),
            SettingField::TopP => Real(self.top_p),
            SettingField::MinP => Real(self.min_p),
            SettingField::NPredict => Integer(self.n_predict),
            SettingField::NKeep => Integer(self.n_keep),
            SettingField::Stream => Bool(self.stream),
            SettingField::TfsZ => Real(self.tfs_z),
            SettingField::TypicalP => Real(self.typical_p),
            SettingField::RepeatPenalty => Real(self.repeat_penalty),
            SettingField::RepeatLastN => Integer(self.repeat_last_n),
            SettingField::PenalizeNl => Bool(self.penalize_nl),
            SettingField::PresencePenalty => Real(self.presence_penalty),
            SettingField::FrequencyPenalty => Real(self.frequency_penalty),
            SettingField::Mirostat => Integer(self.mirostat),
            SettingField::MirostatTau => Real(self.mirostat_tau),
            SettingField::MirostatEta => Real(self.mirostat_eta),
            SettingField::Seed => Integer(self.seed),
            SettingField::IgnoreEos => Bool(self.ignore_eos),
            SettingField::CachePrompt => Bool(self.cache_prompt),
        }
    }

    /// Returns a copy with `field` set to `value`, or the reason it was refused.
    pub fn with_field(&self, field: SettingField, value: SettingValue) -> Result<Self, SettingsError> {
        let checked = field.domain().check(field, value)?;
        let mut next = self.clone();
        next.assign(field, checked);
        Ok(next)
    }

    fn assign(&mut self, field: SettingField, value: SettingValue) {
        match field {
            SettingField::Temperature => self.temperature = value.real(),
            SettingField::TopK => self.top_k = value.integer(),
            SettingField::TopP => self.top_p = value.real(),
            SettingField::MinP => self.min_p = value.real(),
            SettingField::NPredict => self.n_predict = value.integer(),
            SettingField::NKeep => self.n_keep = value.integer(),
            SettingField::Stream => self.stream = value.flag(),
            SettingField::TfsZ => self.tfs_z = value.real(),
            SettingField::TypicalP => self.typical_p = value.real(),
            SettingField::RepeatPenalty => self.repeat_penalty = value.real(),
            SettingField::RepeatLastN => self.repeat_last_n = value.integer(),
            SettingField::PenalizeNl => self.penalize_nl = value.flag(),
            SettingField::PresencePenalty => self.presence_penalty = value.real(),
            SettingField::FrequencyPenalty => self.frequency_penalty = value.real(),
            SettingField::Mirostat => self.mirostat = value.integer(),
            SettingField::MirostatTau => self.mirostat_tau = value.real(),
            SettingField::MirostatEta => self.mirostat_eta = value.real(),
            SettingField::Seed => self.seed = value.integer(),
            SettingField::IgnoreEos => self.ignore_eos = value.flag(),
            SettingField::CachePrompt => self.cache_prompt = value.flag(),
        }
    }
}

/// Sparse set of overrides, keyed by wire name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialSettings(BTreeMap<SettingField, SettingValue>);

impl PartialSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: SettingField, value: SettingValue) -> Self {
        self.0.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: SettingField, value: SettingValue) {
        self.0.insert(field, value);
    }

    pub fn remove(&mut self, field: SettingField) -> Option<SettingValue> {
        self.0.remove(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SettingField, SettingValue)> + '_ {
        self.0.iter().map(|(field, value)| (*field, *value))
    }
}

/// Owner of the live settings object.
#[derive(Debug, Clone, Default)]
pub struct SettingsValidator {
    settings: InferenceSettings,
}

impl SettingsValidator {
    pub fn new(settings: InferenceSettings) -> Self {
        Self { settings }
    }

    pub fn for_profile(profile: SettingsProfile) -> Self {
        Self::new(InferenceSettings::for_profile(profile))
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Validates one edit. On failure the stored settings are left untouched.
    pub fn validate_and_set(
        &mut self,
        field: SettingField,
        value: SettingValue,
    ) -> Result<InferenceSettings, SettingsError> {
        let next = self.settings.with_field(field, value)?;
        self.settings = next.clone();
        Ok(next)
    }

    /// Applies a trusted update without range checks. Used to lay profile
    /// defaults over the base settings; user input goes through
    /// [`SettingsValidator::validate_and_set`] or
    /// [`SettingsValidator::apply_partial`].
    pub fn merge(&mut self, partial: &PartialSettings) -> InferenceSettings {
        for (field, value) in partial.iter() {
            self.settings.assign(field, value);
        }
        self.settings.clone()
    }

    /// Validates every entry of `partial`; either all of them apply or none do.
    pub fn apply_partial(&mut self, partial: &PartialSettings) -> Result<InferenceSettings, SettingsError> {
        let mut next = self.settings.clone();
        for (field, value) in partial.iter() {
            next = next.with_field(field, value)?;
        }
        self.settings = next.clone();
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// No setting with this name exists.
    UnknownField(String),
    /// The text could not be parsed for the field's type.
    InvalidValue { field: SettingField, input: String },
    /// The value has the wrong type for the field (or is not finite).
    TypeMismatch {
        field: SettingField,
        value: SettingValue,
        expected: FieldDomain,
    },
    /// The value lies outside the field's inclusive range.
    OutOfRange {
        field: SettingField,
        value: SettingValue,
        domain: FieldDomain,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::UnknownField(name) => write!(f, "Unknown setting: {name}"),
            SettingsError::InvalidValue { field, input } => {
                write!(f, "Invalid value for {field}: {input:?}")
            }
            SettingsError::TypeMismatch {
                field,
                value,
                expected,
            } => write!(f, "Wrong type for {field}: {value} (expected {expected})"),
            SettingsError::OutOfRange {
                field,
                value,
                domain,
            } => write!(f, "{field} = {value} is out of range {domain}"),
        }
    }
}

impl std::error::Error for SettingsError {}
