//! Pole categorization rules.
//!
//! The attribute rules are category-driven:
//! - rejected poles carry no size, length or diameter;
//! - fencing poles are measured in feet and never carry a diameter;
//! - all other categories are measured in meters and require a butt
//!   diameter between [`DIAMETER_MIN_MM`] and [`DIAMETER_MAX_MM`].
//!
//! The length unit is always derived from the category, never supplied by
//! the caller.

use serde::{Deserialize, Serialize};

use poleyard_core::{DomainError, DomainResult, ValueObject};

/// Inclusive lower bound for the butt diameter of utility poles, in mm.
pub const DIAMETER_MIN_MM: u16 = 150;
/// Inclusive upper bound for the butt diameter of utility poles, in mm.
pub const DIAMETER_MAX_MM: u16 = 240;

/// Commercial category a sorted pole lot falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoleCategory {
    Fencing,
    Telecom,
    Distribution,
    HighVoltage,
    Rejected,
}

impl PoleCategory {
    pub fn is_rejected(self) -> bool {
        matches!(self, PoleCategory::Rejected)
    }

    /// Measurement unit for this category, if it is measured at all.
    pub fn length_unit(self) -> Option<LengthUnit> {
        match self {
            PoleCategory::Rejected => None,
            PoleCategory::Fencing => Some(LengthUnit::Feet),
            PoleCategory::Telecom | PoleCategory::Distribution | PoleCategory::HighVoltage => {
                Some(LengthUnit::Meters)
            }
        }
    }

    /// Whether sorting into this category requires a butt diameter.
    pub fn requires_diameter(self) -> bool {
        matches!(
            self,
            PoleCategory::Telecom | PoleCategory::Distribution | PoleCategory::HighVoltage
        )
    }
}

impl core::fmt::Display for PoleCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PoleCategory::Fencing => "fencing",
            PoleCategory::Telecom => "telecom",
            PoleCategory::Distribution => "distribution",
            PoleCategory::HighVoltage => "high_voltage",
            PoleCategory::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Girth class assigned during sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoleSize {
    Small,
    Medium,
    Stout,
}

/// Unit a sorted lot's length is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "ft")]
    Feet,
    #[serde(rename = "m")]
    Meters,
}

/// Validated sorting attributes of a sorted lot.
///
/// Construct through [`SortedAttributes::validate`]; a value of this type
/// always satisfies the category rules above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedAttributes {
    category: PoleCategory,
    size: Option<PoleSize>,
    length_value: Option<f64>,
    length_unit: Option<LengthUnit>,
    diameter_mm: Option<u16>,
}

impl SortedAttributes {
    /// Validate caller-supplied sorting attributes against the category rules.
    pub fn validate(
        category: PoleCategory,
        size: Option<PoleSize>,
        length_value: Option<f64>,
        diameter_mm: Option<u16>,
    ) -> DomainResult<Self> {
        if category.is_rejected() {
            if size.is_some() || length_value.is_some() || diameter_mm.is_some() {
                return Err(DomainError::validation(
                    "rejected lots carry no size, length or diameter",
                ));
            }
            return Ok(Self {
                category,
                size: None,
                length_value: None,
                length_unit: None,
                diameter_mm: None,
            });
        }

        if size.is_none() {
            return Err(DomainError::validation(format!(
                "size is required for {category} poles"
            )));
        }

        let length = match length_value {
            Some(v) if v > 0.0 => v,
            Some(v) => {
                return Err(DomainError::validation(format!(
                    "length must be positive, got {v}"
                )));
            }
            None => {
                return Err(DomainError::validation(format!(
                    "length is required for {category} poles"
                )));
            }
        };

        let diameter = if category.requires_diameter() {
            match diameter_mm {
                Some(d) if (DIAMETER_MIN_MM..=DIAMETER_MAX_MM).contains(&d) => Some(d),
                Some(d) => {
                    return Err(DomainError::validation(format!(
                        "diameter must be within [{DIAMETER_MIN_MM}, {DIAMETER_MAX_MM}] mm, got {d}"
                    )));
                }
                None => {
                    return Err(DomainError::validation(format!(
                        "diameter is required for {category} poles"
                    )));
                }
            }
        } else {
            if diameter_mm.is_some() {
                return Err(DomainError::validation(
                    "fencing poles do not carry a diameter",
                ));
            }
            None
        };

        Ok(Self {
            category,
            size,
            length_value: Some(length),
            // Unit is derived, never caller-supplied.
            length_unit: category.length_unit(),
            diameter_mm: diameter,
        })
    }

    pub fn category(&self) -> PoleCategory {
        self.category
    }

    pub fn size(&self) -> Option<PoleSize> {
        self.size
    }

    pub fn length_value(&self) -> Option<f64> {
        self.length_value
    }

    pub fn length_unit(&self) -> Option<LengthUnit> {
        self.length_unit
    }

    pub fn diameter_mm(&self) -> Option<u16> {
        self.diameter_mm
    }
}

impl ValueObject for SortedAttributes {}
impl ValueObject for PoleCategory {}
impl ValueObject for PoleSize {}
impl ValueObject for LengthUnit {}
