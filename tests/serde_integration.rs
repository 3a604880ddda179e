//! Integration tests for serde serialization of the public types.

#[cfg(feature = "serde")]
#[cfg(test)]
mod tests {
    use line21::*;

    #[test]
    fn cue_json_round_trip() {
        let json = r#"{
            "start": 12.5,
            "end": 15.0,
            "text": "HELLO\nWORLD",
            "speaker": "ANNA",
            "placement_override": [{"row": 12, "col": 4}, {}]
        }"#;
        let cue: Cue = serde_json::from_str(json).unwrap();
        assert_eq!(cue.start, 12.5);
        assert_eq!(cue.end, Some(15.0));
        assert_eq!(cue.speaker.as_deref(), Some("ANNA"));
        let overrides = cue.placement_override.as_ref().unwrap();
        assert_eq!(overrides[0], LinePlacement { row: Some(12), col: Some(4) });
        assert_eq!(overrides[1], LinePlacement::default());

        let serialized = serde_json::to_string(&cue).unwrap();
        let back: Cue = serde_json::from_str(&serialized).unwrap();
        assert_eq!(cue, back);
    }

    #[test]
    fn cue_fields_default_when_absent() {
        let cue: Cue = serde_json::from_str(r#"{"start": 1.0, "text": "HI"}"#).unwrap();
        assert_eq!(cue.end, None);
        assert_eq!(cue.speaker, None);
        assert_eq!(cue.explicit_lines, None);
    }

    #[test]
    fn options_round_trip_with_defaults() {
        let opts: SccOptions = serde_json::from_str(r#"{"alignment": "left"}"#).unwrap();
        assert_eq!(opts.alignment, Alignment::Left);
        assert_eq!(opts.frame_rate, FrameRate::F29_97);
        assert!(opts.drop_frame);

        let serialized = serde_json::to_string(&opts).unwrap();
        let back: SccOptions = serde_json::from_str(&serialized).unwrap();
        assert_eq!(opts, back);
    }

    #[test]
    fn decoded_document_serializes() {
        let out = generate_scc(
            &[Cue { start: 2.0, end: Some(4.0), text: "JSON TEST".into(), ..Default::default() }],
            &SccOptions::default(),
        )
        .unwrap();
        let doc = decode_scc(&out.text, None).unwrap();
        let json = serde_json::to_string_pretty(&doc).unwrap();
        assert!(json.contains("\"drop_frame\": true"));
        assert!(json.contains("JSON TEST"));
        let back: DecodedDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn verification_report_serializes() {
        let report = verify_scc("Scenarist_SCC V1.0\n\n00:00:01;00\t1420\n", None, 10);
        // Downstream code matches on the issue category by name.
        assert_eq!(report.issues[0].kind, IssueKind::Parity);
        let json = serde_json::to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["parity_errors"], 1);
        assert_eq!(value["issues"][0]["kind"], "parity");
    }
}
