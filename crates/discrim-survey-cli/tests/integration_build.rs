use anyhow::Result;
use discrim_survey::{load_assignments_json, Speaker, Utterance};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const EXP: &str = "sw_40200_12_3_3_1";

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_discrim-survey"))
}

fn write_conversation(path: &Path) -> Result<()> {
    let conv: Vec<Utterance> = [
        (10, Speaker::B, "so what do you do"),
        (11, Speaker::A, "%um i teach"),
        (12, Speaker::B, "oh ^really"),
        (13, Speaker::B, "{laugh} nice"),
    ]
    .into_iter()
    .map(|(id, speaker, text)| Utterance {
        conv_id: "sw_40200".to_string(),
        utter_id: id,
        start: id as f64,
        stop: id as f64 + 1.0,
        speaker,
        text: text.to_string(),
        clean_text: text.to_string(),
    })
    .collect();
    fs::write(path, serde_json::to_string(&conv)?)?;
    Ok(())
}

/// Minimal qsf template: blocks, flow, eight pass-through elements and the
/// two question templates.
fn write_template(path: &Path) -> Result<()> {
    let question = serde_json::json!({
        "Element": "SQ",
        "PrimaryAttribute": "QID1",
        "SecondaryAttribute": "QID1",
        "Payload": {"QuestionID": "QID1", "Choices": {"1": {"Display": ""}}}
    });
    let mut elements = vec![
        serde_json::json!({"Element": "BL", "Payload": [{"ID": "BL_1", "BlockElements": []}]}),
        serde_json::json!({"Element": "FL", "Payload": {"Flow": [{}, {"Flow": []}], "Properties": {"Count": 2}}}),
    ];
    for tag in ["RS", "SO", "SCO", "PROJ", "STAT", "QC", "X1", "X2"] {
        elements.push(serde_json::json!({ "Element": tag }));
    }
    elements.push(question.clone());
    elements.push(question);
    fs::write(
        path,
        serde_json::to_string(&serde_json::json!({ "SurveyElements": elements }))?,
    )?;
    Ok(())
}

#[test]
fn render_prints_context_markup() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conv = dir.path().join("conversation.json");
    write_conversation(&conv)?;

    let output = bin()
        .args(["render", "--conversation"])
        .arg(&conv)
        .args(["--utter-id", "12", "--after", "1"])
        .output()?;
    assert!(output.status.success());
    let html = String::from_utf8(output.stdout)?;
    assert!(html.contains("<b>um i teach</b>"));
    assert!(html.contains(r#"<div class="message last"><b>oh really</b></div>"#));
    assert!(html.contains(r#"<div class="message last">{laugh} nice</div>"#));
    Ok(())
}

#[test]
fn render_fails_for_unknown_utterance() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conv = dir.path().join("conversation.json");
    write_conversation(&conv)?;

    let output = bin()
        .args(["render", "--conversation"])
        .arg(&conv)
        .args(["--utter-id", "99"])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}

/// Experiment directory, template, audio snippet and config under `root`;
/// returns the config path.
fn write_build_fixture(root: &Path) -> Result<PathBuf> {
    let exp_dir = root.join("data").join(EXP);
    fs::create_dir_all(&exp_dir)?;
    write_conversation(&exp_dir.join("conversation.json"))?;
    for wav in ["0.wav", "1.wav", "0_indv.wav", "1_indv.wav"] {
        fs::write(exp_dir.join(wav), b"")?;
    }
    write_template(&root.join("template.json"))?;
    fs::write(root.join("audio.html"), r#"<audio controls src="$url"></audio>"#)?;
    let config = root.join("survey.toml");
    fs::write(
        &config,
        r#"
survey_id = "SV_cli"
template = "template.json"
audio_template = "audio.html"
output_prefix = "out/discrim"
base_path = "data"
base_url = "https://example.org/exp/"
repeats = 2
conditions = [
    { window = { before = 0, after = 0 }, individual = true },
    { window = { before = 2, after = 0 }, individual = false },
]
"#,
    )?;
    Ok(config)
}

#[test]
fn build_writes_one_survey_per_participant() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    let config = write_build_fixture(root)?;

    let output = bin()
        .args(["build", "--seed", "17", "--config"])
        .arg(&config)
        .output()?;
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    for participant in ["a", "b", "c", "d"] {
        let qsf: serde_json::Value = serde_json::from_str(&fs::read_to_string(
            root.join(format!("out/discrim_{}.qsf", participant)),
        )?)?;
        let elements = qsf["SurveyElements"].as_array().unwrap();
        assert_eq!(elements.len(), 2 + 8 + 1 + 1);
        assert_eq!(elements[10]["Payload"]["QuestionID"], "QID4");
    }

    let table = load_assignments_json(&root.join("out/discrim_assignments.json"))?;
    assert_eq!(table.experiment_ids, vec![EXP.to_string()]);
    assert_eq!(table.condition_counts(EXP, 2), vec![2, 2]);
    Ok(())
}

#[test]
fn build_all_conditions_writes_a_single_survey() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    let config = write_build_fixture(root)?;

    let output = bin()
        .args(["build", "--all-conditions", "--config"])
        .arg(&config)
        .output()?;
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let qsf: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("out/discrim_all.qsf"))?)?;
    let elements = qsf["SurveyElements"].as_array().unwrap();
    assert_eq!(elements.len(), 2 + 8 + 2 + 1);
    assert_eq!(elements[10]["Payload"]["DataExportTag"], format!("Q0_{}", EXP));
    assert_eq!(elements[11]["Payload"]["DataExportTag"], format!("Q1_{}", EXP));
    assert!(!root.join("out/discrim_a.qsf").exists());
    assert!(!root.join("out/discrim_assignments.json").exists());
    Ok(())
}
