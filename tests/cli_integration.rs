//! Integration tests for the line21 CLI.

#[cfg(feature = "cli")]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    const CUES_JSON: &str = r#"[
        {"start": 1.0, "end": 3.0, "text": "HELLO\nWORLD"},
        {"start": 6.0, "end": 8.0, "text": "SECOND CAPTION"}
    ]"#;

    fn encode_scc() -> String {
        let mut cmd = Command::cargo_bin("line21").unwrap();
        let output = cmd
            .args(["encode", "-"])
            .write_stdin(CUES_JSON)
            .output()
            .expect("failed to run encode");
        assert!(output.status.success());
        String::from_utf8(output.stdout).expect("output should be UTF-8")
    }

    #[test]
    fn encode_writes_scc_document() {
        let scc = encode_scc();
        assert!(scc.starts_with("Scenarist_SCC V1.0\n\n"));
        assert!(scc.contains("9420"), "expected RCL words in {scc:?}");
    }

    #[test]
    fn generated_document_verifies_clean() {
        let scc = encode_scc();
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.args(["verify", "-"])
            .write_stdin(scc)
            .assert()
            .success()
            .stdout(predicate::str::contains("no issues"));
    }

    #[test]
    fn corrupted_document_fails_verify() {
        let scc = encode_scc().replacen("9420", "1420", 1);
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.args(["verify", "-"])
            .write_stdin(scc)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("parity"));
    }

    #[test]
    fn verify_json_output() {
        let scc = encode_scc();
        let mut cmd = Command::cargo_bin("line21").unwrap();
        let output = cmd
            .args(["-o", "json", "verify", "-"])
            .write_stdin(scc)
            .output()
            .expect("failed to run verify");
        assert!(output.status.success());
        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
        assert_eq!(json["ok"], true);
        assert_eq!(json["parity_errors"], 0);
    }

    #[test]
    fn decode_round_trips_text() {
        let scc = encode_scc();
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.args(["decode", "-"])
            .write_stdin(scc)
            .assert()
            .success()
            .stdout(predicate::str::contains("HELLO"))
            .stdout(predicate::str::contains("SECOND CAPTION"));
    }

    #[test]
    fn mcc_subcommand_writes_container() {
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.args(["mcc", "-"])
            .write_stdin(CUES_JSON)
            .assert()
            .success()
            .stdout(predicate::str::contains("File Format=MacCaption_MCC V1.0"))
            .stdout(predicate::str::contains("Time Code Rate=30DF"));
    }

    #[test]
    fn help_describes_subcommands() {
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Encode, decode and verify"))
            .stdout(predicate::str::contains("verify"))
            .stdout(predicate::str::contains("mcc"));
    }

    #[test]
    fn bad_cue_json_reports_error() {
        let mut cmd = Command::cargo_bin("line21").unwrap();
        cmd.args(["encode", "-"])
            .write_stdin("not json")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("parsing cue JSON"));
    }
}
