use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    Detections,
    Classification,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub slot: usize,
    pub class_name: String,
    // display space, origin at center
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub color: [f32; 4],
    pub world: Option<[f32; 3]>,
}

/// What the notification sink publishes after each processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub ts_unix_ms: i64,
    pub kind: ReportKind,
    /// Detections processed this frame (after the cap, before label checks).
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationRecord>,
    // Classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub msg: String,
}

impl FrameReport {
    pub fn new(ts_unix_ms: i64, kind: ReportKind, count: usize) -> Self {
        Self {
            ts_unix_ms,
            kind,
            count,
            annotations: Vec::new(),
            class_index: None,
            class_label: None,
            score: None,
            msg: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_report_omits_classification_fields() {
        let mut r = FrameReport::new(1_700_000_000_000, ReportKind::Detections, 1);
        r.annotations.push(AnnotationRecord {
            slot: 0,
            class_name: "hose".into(),
            cx: 0.0,
            cy: 0.0,
            w: 32.0,
            h: 32.0,
            color: [0.0, 0.0, 1.0, 1.0],
            world: None,
        });
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"kind\":\"Detections\""));
        assert!(json.contains("\"class_name\":\"hose\""));
        assert!(!json.contains("class_index"));
        assert!(!json.contains("score"));
    }

    #[test]
    fn classification_report_parses_without_annotations() {
        let json = r#"{"ts_unix_ms":5,"kind":"Classification","count":3,"class_index":-1,"msg":"none"}"#;
        let r: FrameReport = serde_json::from_str(json).unwrap();
        assert_eq!(r.kind, ReportKind::Classification);
        assert_eq!(r.class_index, Some(-1));
        assert!(r.annotations.is_empty());
    }
}
