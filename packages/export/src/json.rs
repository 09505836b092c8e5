use crate::error::ExportResult;
use crate::model::ExportData;

/// Serializes the export document as indented JSON.
pub fn export_json(data: &ExportData) -> ExportResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn output_is_indented_and_round_trips() {
        let data = ExportData {
            version: "1.0".into(),
            timestamp: "2024-05-01T12:00:00Z".into(),
            scope: "full".into(),
            filters: HashMap::new(),
            nodes: vec![],
            edges: vec![],
        };

        let bytes = export_json(&data).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  \"version\": \"1.0\""));

        let back: ExportData = serde_json::from_str(&text).unwrap();
        assert_eq!(back.scope, "full");
    }
}
