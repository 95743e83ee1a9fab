//! Named scalar losses and metrics of one forward call.

use crate::common::*;

pub const LOSS: &str = "loss";
pub const LOSS_CLS: &str = "loss_cls";
pub const LOSS_SEG: &str = "loss_seg";
pub const ACCURACY: &str = "accuracy";
pub const CLS_IU: &str = "cls_iu";
pub const INS_IU: &str = "ins_iu";

/// The keys a report may hold, in reporting order.
pub const REPORT_KEYS: [&str; 6] = [LOSS, LOSS_CLS, LOSS_SEG, ACCURACY, CLS_IU, INS_IU];

/// Scalar values keyed by name. Undefined values are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    values: IndexMap<String, f64>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value under one of the [REPORT_KEYS]. `None` leaves the key absent.
    pub fn insert(&mut self, key: &str, value: Option<f64>) -> Result<()> {
        ensure!(REPORT_KEYS.contains(&key), "unknown report key '{}'", key);
        if let Some(value) = value {
            self.values.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(key, &value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn log(&self) {
        let text = self
            .iter()
            .map(|(key, value)| format!("{}={:.5}", key, value))
            .join(" ");
        info!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_values_are_skipped() -> Result<()> {
        let mut report = Report::new();
        report.insert(LOSS, Some(1.5))?;
        report.insert(ACCURACY, None)?;
        report.insert(INS_IU, Some(0.25))?;

        assert_eq!(report.len(), 2);
        assert_eq!(report.get(LOSS), Some(1.5));
        assert_eq!(report.get(ACCURACY), None);
        assert!(report.insert("precision", Some(1.0)).is_err());

        let json = serde_json::to_string(&report)?;
        assert_eq!(json, r#"{"loss":1.5,"ins_iu":0.25}"#);
        Ok(())
    }
}
