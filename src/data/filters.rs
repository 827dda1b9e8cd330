use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Threshold bundle editable at runtime.
///
/// Initialized from config.yaml at startup, then replaced wholesale through
/// `SessionStore::update_filters`, which validates before committing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFilters {
    pub open_5m_range_pct_min: f64,
    pub open_5m_range_pct_max: f64,
    pub open_5m_vol_min: f64,
    pub open_5m_vol_max: f64,

    #[serde(default)]
    pub open_5m_today_pct_min: f64,
    #[serde(default = "unbounded")]
    pub open_5m_today_pct_max: f64,

    #[serde(rename = "entry_minutes_after_open_min")]
    pub entry_min_after_open: u32,
    #[serde(rename = "entry_minutes_after_open_max")]
    pub entry_max_after_open: u32,
    pub entry_price_min: f64,
    pub entry_price_max: f64,
}

fn unbounded() -> f64 {
    f64::MAX
}

impl RuntimeFilters {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.open_5m_range_pct_min <= 0.0 {
            return Err(FilterError::NonPositive { field: "open_5m_range_pct_min" });
        }
        check_bounds("open_5m_range_pct", self.open_5m_range_pct_min, self.open_5m_range_pct_max)?;
        check_bounds("open_5m_vol", self.open_5m_vol_min, self.open_5m_vol_max)?;
        check_bounds("open_5m_today_pct", self.open_5m_today_pct_min, self.open_5m_today_pct_max)?;
        check_bounds(
            "entry_minutes_after_open",
            f64::from(self.entry_min_after_open),
            f64::from(self.entry_max_after_open),
        )?;
        check_bounds("entry_price", self.entry_price_min, self.entry_price_max)?;
        Ok(())
    }

    pub fn range_pct_ok(&self, range_pct: f64) -> bool {
        range_pct >= self.open_5m_range_pct_min && range_pct <= self.open_5m_range_pct_max
    }

    pub fn volume_ok(&self, volume: f64) -> bool {
        volume >= self.open_5m_vol_min && volume <= self.open_5m_vol_max
    }

    pub fn today_pct_ok(&self, today_pct: f64) -> bool {
        today_pct >= self.open_5m_today_pct_min && today_pct <= self.open_5m_today_pct_max
    }

    pub fn entry_price_ok(&self, price: f64) -> bool {
        price >= self.entry_price_min && price <= self.entry_price_max
    }
}

fn check_bounds(field: &'static str, min: f64, max: f64) -> Result<(), FilterError> {
    if min.is_nan() || max.is_nan() || max < min {
        return Err(FilterError::InvalidBounds { field, min, max });
    }
    Ok(())
}

/// Partial filter update; absent fields keep their committed value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FiltersPatch {
    pub open_5m_range_pct_min: Option<f64>,
    pub open_5m_range_pct_max: Option<f64>,
    pub open_5m_vol_min: Option<f64>,
    pub open_5m_vol_max: Option<f64>,
    pub open_5m_today_pct_min: Option<f64>,
    pub open_5m_today_pct_max: Option<f64>,
    #[serde(rename = "entry_minutes_after_open_min")]
    pub entry_min_after_open: Option<u32>,
    #[serde(rename = "entry_minutes_after_open_max")]
    pub entry_max_after_open: Option<u32>,
    pub entry_price_min: Option<f64>,
    pub entry_price_max: Option<f64>,
}

impl FiltersPatch {
    pub fn apply_to(&self, f: &mut RuntimeFilters) {
        if let Some(v) = self.open_5m_range_pct_min { f.open_5m_range_pct_min = v; }
        if let Some(v) = self.open_5m_range_pct_max { f.open_5m_range_pct_max = v; }
        if let Some(v) = self.open_5m_vol_min { f.open_5m_vol_min = v; }
        if let Some(v) = self.open_5m_vol_max { f.open_5m_vol_max = v; }
        if let Some(v) = self.open_5m_today_pct_min { f.open_5m_today_pct_min = v; }
        if let Some(v) = self.open_5m_today_pct_max { f.open_5m_today_pct_max = v; }
        if let Some(v) = self.entry_min_after_open { f.entry_min_after_open = v; }
        if let Some(v) = self.entry_max_after_open { f.entry_max_after_open = v; }
        if let Some(v) = self.entry_price_min { f.entry_price_min = v; }
        if let Some(v) = self.entry_price_max { f.entry_price_max = v; }
    }
}
