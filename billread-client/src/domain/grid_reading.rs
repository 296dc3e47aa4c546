use time::PrimitiveDateTime;

/// One row of a company's reading set: a grid instant and the two energy
/// channels observed at it.
///
/// `None` means the source had no usable reading for that instant. It is
/// never folded into `0.0`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridReading {
    pub company: String,
    pub ts: PrimitiveDateTime,
    pub kwh: Option<f64>,
    pub kvarh: Option<f64>,
}

impl GridReading {
    pub fn absent(company: impl Into<String>, ts: PrimitiveDateTime) -> Self {
        Self {
            company: company.into(),
            ts,
            kwh: None,
            kvarh: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kwh.is_none() && self.kvarh.is_none()
    }
}
