//! qsf survey assembly.
//!
//! A qsf file is a JSON document whose `SurveyElements` array holds the
//! survey's blocks, flow, options and questions. We start from a template
//! exported from the survey platform and patch it per participant:
//!
//! 1. stamp the survey id on every element;
//! 2. clone the template question once per assigned experiment and fill in
//!    ids, audio choices and the rendered conversation context;
//! 3. register the new questions in the blocks and flow;
//! 4. update the question count and reassemble `SurveyElements`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use crate::assign::{AssignmentTable, Condition};
use crate::config::{SurveyConfig, SurveyLayout};
use crate::error::SurveyError;
use crate::experiment::{choice_slot, select_audio, AudioUrls, ExperimentId};
use crate::model::speaker_turn::SpeakerTurn;
use crate::model::utterance::Utterance;
use crate::render::{render_context_window, render_preceding_context};
use crate::template::HtmlTemplate;
use crate::turns::make_speaker_turns;

/// Supplies the utterances of an experiment's conversation.
pub trait ConversationSource {
    fn load(&self, experiment_id: &str) -> Result<Vec<Utterance>>;
}

/// Reads `{base_path}/{experiment_id}/conversation.json`.
pub struct FsConversations<'a> {
    pub config: &'a SurveyConfig,
}

impl ConversationSource for FsConversations<'_> {
    fn load(&self, experiment_id: &str) -> Result<Vec<Utterance>> {
        crate::load_conversation_json(&self.config.conversation_path(experiment_id))
    }
}

impl ConversationSource for HashMap<String, Vec<Utterance>> {
    fn load(&self, experiment_id: &str) -> Result<Vec<Utterance>> {
        self.get(experiment_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no conversation for experiment {}", experiment_id))
    }
}

/// HTML snippets used when filling questions.
#[derive(Debug, Clone)]
pub struct QuestionAssets {
    /// Audio player with a `$url` placeholder.
    pub audio_player: HtmlTemplate,
    /// Optional wrapper around the rendered context, `$content` placeholder.
    pub question_wrapper: Option<HtmlTemplate>,
}

impl QuestionAssets {
    pub fn from_config(config: &SurveyConfig) -> Result<Self> {
        let audio_player = HtmlTemplate::from_file(&config.audio_template)
            .with_context(|| format!("reading {}", config.audio_template.display()))?;
        let question_wrapper = match &config.question_template {
            Some(p) => Some(
                HtmlTemplate::from_file(p).with_context(|| format!("reading {}", p.display()))?,
            ),
            None => None,
        };
        Ok(QuestionAssets {
            audio_player,
            question_wrapper,
        })
    }

    fn question_text(&self, content: &str) -> Result<String> {
        Ok(match &self.question_wrapper {
            Some(t) => t.substitute(&[("content", content)])?,
            None => content.to_string(),
        })
    }
}

/// A generated survey for one participant.
#[derive(Debug, Clone)]
pub struct BuiltSurvey {
    pub participant: String,
    pub document: Value,
    /// Template questions plus generated ones.
    pub survey_length: usize,
    /// `DataExportTag` of every generated question, in survey order.
    pub export_tags: Vec<String>,
}

/// A generated question and its QID.
struct GeneratedQuestion {
    qid: String,
    export_tag: String,
    element: Value,
}

fn template_err(msg: impl Into<String>) -> SurveyError {
    SurveyError::Template(msg.into())
}

fn at_mut<'v>(value: &'v mut Value, pointer: &str) -> Result<&'v mut Value, SurveyError> {
    value
        .pointer_mut(pointer)
        .ok_or_else(|| template_err(format!("missing {}", pointer)))
}

fn as_object_mut<'v>(
    value: &'v mut Value,
    what: &str,
) -> Result<&'v mut Map<String, Value>, SurveyError> {
    value
        .as_object_mut()
        .ok_or_else(|| template_err(format!("{} is not an object", what)))
}

fn as_array_mut<'v>(value: &'v mut Value, what: &str) -> Result<&'v mut Vec<Value>, SurveyError> {
    value
        .as_array_mut()
        .ok_or_else(|| template_err(format!("{} is not an array", what)))
}

/// Set `SurveyID` on every element.
pub fn set_survey_id(elements: &mut [Value], survey_id: &str) -> Result<(), SurveyError> {
    for (i, element) in elements.iter_mut().enumerate() {
        as_object_mut(element, &format!("SurveyElements[{}]", i))?
            .insert("SurveyID".to_string(), json!(survey_id));
    }
    Ok(())
}

/// Clone `basis` and give it question number `qid_number` and `export_tag`.
pub fn question_set_up(
    basis: &Value,
    survey_id: &str,
    qid_number: usize,
    export_tag: &str,
) -> Result<Value, SurveyError> {
    let qid = format!("QID{}", qid_number);
    let mut question = basis.clone();

    let payload = as_object_mut(at_mut(&mut question, "/Payload")?, "Payload")?;
    payload.insert("QuestionID".to_string(), json!(qid));
    payload.insert("DataExportTag".to_string(), json!(export_tag));
    payload.insert(
        "QuestionDescription".to_string(),
        json!(format!("Q{}", qid_number)),
    );

    let root = as_object_mut(&mut question, "question")?;
    root.insert("SurveyID".to_string(), json!(survey_id));
    root.insert("PrimaryAttribute".to_string(), json!(qid));
    root.insert("SecondaryAttribute".to_string(), json!(qid));
    Ok(question)
}

/// Replace the question's choices with one audio player per selected URL.
///
/// The template's choice `"1"` is the model for every choice; each URL lands
/// in the slot given by its file name's leading digit.
pub fn update_choices(
    question: &mut Value,
    urls: &[String],
    individual: bool,
    audio_player: &HtmlTemplate,
) -> Result<(), SurveyError> {
    let choice_template = at_mut(question, "/Payload/Choices/1")?.clone();

    let mut choices = Map::new();
    for url in select_audio(urls, individual) {
        let slot = choice_slot(url)
            .ok_or_else(|| template_err(format!("audio file {} has no choice digit", url)))?;
        let mut choice = choice_template.clone();
        as_object_mut(&mut choice, "choice")?.insert(
            "Display".to_string(),
            json!(audio_player.substitute(&[("url", url)])?),
        );
        choices.insert(slot.to_string(), choice);
    }

    *at_mut(question, "/Payload/Choices")? = Value::Object(choices);
    Ok(())
}

/// Set the question text.
pub fn update_text(question: &mut Value, text: String) -> Result<(), SurveyError> {
    as_object_mut(at_mut(question, "/Payload")?, "Payload")?
        .insert("QuestionText".to_string(), Value::String(text));
    Ok(())
}

fn block_set_up(block_id: &str, questions: &[&GeneratedQuestion]) -> Value {
    let mut elements = Vec::with_capacity(questions.len() * 2);
    for q in questions {
        elements.push(json!({"Type": "Question", "QuestionID": q.qid}));
        elements.push(json!({"Type": "Page Break"}));
    }
    json!({
        "Type": "Standard",
        "SubType": "",
        "Description": format!("{} Block", block_id),
        "ID": block_id,
        "BlockElements": elements,
        "Options": {
            "BlockLocking": "false",
            "RandomizeQuestions": "false",
            "BlockVisibility": "Collapsed"
        }
    })
}

fn flow_set_up(block_id: &str, flow_index: usize) -> Value {
    json!({
        "Type": "Standard",
        "ID": block_id,
        "FlowID": format!("FL_{}", flow_index),
        "Autofill": []
    })
}

/// Participant key of the survey built by
/// [`SurveyBuilder::build_all_conditions`].
pub const ALL_CONDITIONS_SURVEY: &str = "all";

/// The template's elements with the survey id stamped, plus the two question
/// templates at its end.
struct TemplateParts {
    elements: Vec<Value>,
    discrim_basis: Value,
    gender_basis: Value,
}

/// Builds qsf documents from a template.
pub struct SurveyBuilder<'a, S: ConversationSource> {
    config: &'a SurveyConfig,
    template: &'a Value,
    assets: &'a QuestionAssets,
    urls: &'a AudioUrls,
    conversations: S,
}

impl<'a, S: ConversationSource> SurveyBuilder<'a, S> {
    pub fn new(
        config: &'a SurveyConfig,
        template: &'a Value,
        assets: &'a QuestionAssets,
        urls: &'a AudioUrls,
        conversations: S,
    ) -> Self {
        SurveyBuilder {
            config,
            template,
            assets,
            urls,
            conversations,
        }
    }

    /// Build the survey for `participant` from their row of `table`.
    pub fn build_participant(
        &self,
        participant: &str,
        table: &AssignmentTable,
    ) -> Result<BuiltSurvey> {
        let cfg = self.config;
        let parts = self.template_parts()?;

        // Generated questions grouped per experiment (one block each).
        let mut groups: Vec<Vec<GeneratedQuestion>> = Vec::new();
        let mut next_qid = cfg.first_question_id;

        for (exp_id, cond_idx) in table.structure(participant) {
            let condition: &Condition = cfg.conditions.get(cond_idx).ok_or_else(|| {
                anyhow::anyhow!(
                    "participant {} assigned condition {} but only {} are configured",
                    participant,
                    cond_idx,
                    cfg.conditions.len()
                )
            })?;
            let experiment = ExperimentId::parse(exp_id)?;
            let turns = self.speaker_turns(exp_id)?;

            let mut group = vec![self.discrim_question(
                &parts.discrim_basis,
                &experiment,
                &turns,
                condition,
                format!("C{}_{}", cond_idx, exp_id),
                &mut next_qid,
            )?];

            let wants_gender_check = cfg.layout == SurveyLayout::Blocks
                && !condition.individual
                && experiment.gender().is_some();
            if wants_gender_check {
                let export_tag = format!("G_{}", exp_id);
                let mut question =
                    question_set_up(&parts.gender_basis, &cfg.survey_id, next_qid, &export_tag)?;
                let context =
                    render_preceding_context(&turns, experiment.target_utter_id(), 0)
                        .with_context(|| format!("rendering gender context for {}", exp_id))?;
                update_text(&mut question, self.assets.question_text(&context)?)?;
                group.push(GeneratedQuestion {
                    qid: format!("QID{}", next_qid),
                    export_tag,
                    element: question,
                });
                next_qid += 1;
            }

            groups.push(group);
        }

        self.assemble(participant, parts.elements, groups, cfg.layout)
    }

    /// Build one flat survey that asks every experiment under every
    /// configured condition.
    ///
    /// Experiments follow the URL map's order and each gets one question per
    /// condition, tagged `Q{condition}_{experiment}`. No assignment table is
    /// involved.
    pub fn build_all_conditions(&self) -> Result<BuiltSurvey> {
        let cfg = self.config;
        let parts = self.template_parts()?;

        let mut groups = Vec::with_capacity(self.urls.len());
        let mut next_qid = cfg.first_question_id;
        for exp_id in self.urls.keys() {
            let experiment = ExperimentId::parse(exp_id)?;
            let turns = self.speaker_turns(exp_id)?;
            let mut group = Vec::with_capacity(cfg.conditions.len());
            for (cond_idx, condition) in cfg.conditions.iter().enumerate() {
                group.push(self.discrim_question(
                    &parts.discrim_basis,
                    &experiment,
                    &turns,
                    condition,
                    format!("Q{}_{}", cond_idx, exp_id),
                    &mut next_qid,
                )?);
            }
            groups.push(group);
        }

        self.assemble(
            ALL_CONDITIONS_SURVEY,
            parts.elements,
            groups,
            SurveyLayout::Flat,
        )
    }

    fn template_parts(&self) -> Result<TemplateParts> {
        let layout = &self.config.elements;
        let mut elements = self
            .template
            .pointer("/SurveyElements")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| template_err("SurveyElements is missing or not an array"))?;
        let needed = [
            layout.blocks,
            layout.flow,
            layout.response_set,
            layout.question_count,
            layout.passthrough_end.saturating_sub(1),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        if elements.len() < 2 || elements.len() <= needed {
            return Err(template_err(format!(
                "template has {} survey elements, layout needs more than {}",
                elements.len(),
                needed
            ))
            .into());
        }
        set_survey_id(&mut elements, &self.config.survey_id)?;

        let discrim_basis = elements[elements.len() - 1].clone();
        let gender_basis = elements[elements.len() - 2].clone();
        Ok(TemplateParts {
            elements,
            discrim_basis,
            gender_basis,
        })
    }

    fn speaker_turns(&self, exp_id: &str) -> Result<Vec<SpeakerTurn>> {
        let utterances = self
            .conversations
            .load(exp_id)
            .with_context(|| format!("loading conversation for {}", exp_id))?;
        Ok(make_speaker_turns(&utterances)?)
    }

    /// One audio question for `experiment` under `condition`; takes the next
    /// free QID.
    fn discrim_question(
        &self,
        basis: &Value,
        experiment: &ExperimentId,
        turns: &[SpeakerTurn],
        condition: &Condition,
        export_tag: String,
        next_qid: &mut usize,
    ) -> Result<GeneratedQuestion> {
        let exp_id = experiment.to_string();
        let audio = self
            .urls
            .get(&exp_id)
            .ok_or_else(|| anyhow::anyhow!("no audio urls for experiment {}", exp_id))?;

        let mut question = question_set_up(basis, &self.config.survey_id, *next_qid, &export_tag)?;
        update_choices(
            &mut question,
            audio,
            condition.individual,
            &self.assets.audio_player,
        )?;
        let context = render_context_window(
            turns,
            experiment.target_utter_id(),
            condition.window.before,
            condition.window.after,
            condition.individual,
        )
        .with_context(|| format!("rendering context for {}", exp_id))?;
        update_text(&mut question, self.assets.question_text(&context)?)?;

        let generated = GeneratedQuestion {
            qid: format!("QID{}", next_qid),
            export_tag,
            element: question,
        };
        *next_qid += 1;
        Ok(generated)
    }

    /// Register the generated questions in blocks and flow, update the
    /// question count and reassemble `SurveyElements`.
    fn assemble(
        &self,
        participant: &str,
        mut elements: Vec<Value>,
        groups: Vec<Vec<GeneratedQuestion>>,
        survey_layout: SurveyLayout,
    ) -> Result<BuiltSurvey> {
        let cfg = self.config;
        let layout = &cfg.elements;

        let n_generated: usize = groups.iter().map(Vec::len).sum();
        let survey_length = cfg.template_question_count + n_generated;

        let mut blocks = elements[layout.blocks].clone();
        let mut flow = elements[layout.flow].clone();
        let response_set = elements[layout.response_set].clone();

        match survey_layout {
            SurveyLayout::Flat => {
                let block_elements = as_array_mut(
                    at_mut(&mut blocks, "/Payload/0/BlockElements")?,
                    "BlockElements",
                )?;
                for q in groups.iter().flatten() {
                    block_elements.push(json!({"Type": "Question", "QuestionID": q.qid}));
                    block_elements.push(json!({"Type": "Page Break"}));
                }
            }
            SurveyLayout::Blocks => {
                let payload = as_array_mut(at_mut(&mut blocks, "/Payload")?, "blocks Payload")?;
                let mut randomized = Vec::with_capacity(groups.len());
                for (i, group) in groups.iter().enumerate() {
                    let block_id = format!("BL_{}", i + layout.first_block_index);
                    let members: Vec<&GeneratedQuestion> = group.iter().collect();
                    payload.push(block_set_up(&block_id, &members));
                    randomized.push(flow_set_up(&block_id, i + layout.first_flow_index));
                }
                let subset = cfg.questions_per_participant.unwrap_or(groups.len());
                let randomizer = as_object_mut(
                    at_mut(&mut flow, &format!("/Payload/Flow/{}", layout.randomizer))?,
                    "block randomizer",
                )?;
                randomizer.insert("Flow".to_string(), Value::Array(randomized));
                randomizer.insert("SubSet".to_string(), json!(subset));
            }
        }
        *at_mut(&mut flow, "/Payload/Properties/Count")? = json!(survey_length);

        as_object_mut(&mut elements[layout.question_count], "question count")?.insert(
            "SecondaryAttribute".to_string(),
            json!(survey_length.to_string()),
        );

        let passthrough = elements
            .get(layout.passthrough_start..layout.passthrough_end)
            .ok_or_else(|| template_err("pass-through range outside SurveyElements"))?;

        let export_tags: Vec<String> = groups
            .iter()
            .flatten()
            .map(|q| q.export_tag.clone())
            .collect();

        let mut out = Vec::with_capacity(2 + passthrough.len() + n_generated + 1);
        out.push(blocks);
        out.push(flow);
        out.extend(passthrough.iter().cloned());
        out.extend(groups.into_iter().flatten().map(|q| q.element));
        if survey_layout == SurveyLayout::Flat {
            out.push(response_set);
        }

        let mut document = self.template.clone();
        *at_mut(&mut document, "/SurveyElements")? = Value::Array(out);

        log::info!(
            "built survey for participant {} with {} questions ({} layout)",
            participant,
            survey_length,
            survey_layout.as_str()
        );
        Ok(BuiltSurvey {
            participant: participant.to_string(),
            document,
            survey_length,
            export_tags,
        })
    }
}

/// Write a qsf document with four-space indentation.
pub fn write_qsf(document: &Value, path: &Path) -> Result<()> {
    crate::write_json_pretty(document, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis_question() -> Value {
        json!({
            "SurveyID": "SV_old",
            "Element": "SQ",
            "PrimaryAttribute": "QID1",
            "SecondaryAttribute": "QID1",
            "Payload": {
                "QuestionText": "",
                "QuestionID": "QID1",
                "Choices": {"1": {"Display": "placeholder"}}
            }
        })
    }

    #[test]
    fn set_up_assigns_ids() {
        let q = question_set_up(&basis_question(), "SV_new", 7, "C1_sw_1_2_3_4_5").unwrap();
        assert_eq!(q["SurveyID"], "SV_new");
        assert_eq!(q["PrimaryAttribute"], "QID7");
        assert_eq!(q["SecondaryAttribute"], "QID7");
        assert_eq!(q["Payload"]["QuestionID"], "QID7");
        assert_eq!(q["Payload"]["QuestionDescription"], "Q7");
        assert_eq!(q["Payload"]["DataExportTag"], "C1_sw_1_2_3_4_5");
    }

    #[test]
    fn choices_are_keyed_by_file_digit() {
        let mut q = basis_question();
        let urls = vec![
            "https://h/e/1.wav".to_string(),
            "https://h/e/0.wav".to_string(),
            "https://h/e/0_indv.wav".to_string(),
        ];
        let player = HtmlTemplate::new(r#"<audio src="$url"/>"#);
        update_choices(&mut q, &urls, false, &player).unwrap();
        let choices = q["Payload"]["Choices"].as_object().unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices["1"]["Display"], r#"<audio src="https://h/e/0.wav"/>"#);
        assert_eq!(choices["2"]["Display"], r#"<audio src="https://h/e/1.wav"/>"#);

        let mut q = basis_question();
        update_choices(&mut q, &urls, true, &player).unwrap();
        let choices = q["Payload"]["Choices"].as_object().unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices["1"]["Display"], r#"<audio src="https://h/e/0_indv.wav"/>"#);
    }

    fn in_memory_conversation(exp_id: &str) -> Vec<Utterance> {
        use crate::model::utterance::Speaker;
        [(1, Speaker::A, "hi"), (2, Speaker::B, "hello"), (3, Speaker::A, "bye")]
            .into_iter()
            .map(|(id, speaker, text)| Utterance {
                conv_id: exp_id.to_string(),
                utter_id: id,
                start: 0.0,
                stop: 1.0,
                speaker,
                text: text.to_string(),
                clean_text: text.to_string(),
            })
            .collect()
    }

    fn small_template() -> Value {
        let mut elements = vec![
            json!({"Element": "BL", "Payload": [{"ID": "BL_1", "BlockElements": []}]}),
            json!({"Element": "FL", "Payload": {"Flow": [{}, {"Flow": []}], "Properties": {"Count": 2}}}),
        ];
        for tag in ["RS", "SO", "SCO", "PROJ", "STAT", "QC", "X1", "X2"] {
            elements.push(json!({ "Element": tag }));
        }
        elements.push(basis_question());
        elements.push(basis_question());
        json!({ "SurveyElements": elements })
    }

    fn small_config() -> SurveyConfig {
        SurveyConfig {
            survey_id: "SV_mem".to_string(),
            template: "template.json".into(),
            audio_template: "audio.html".into(),
            question_template: None,
            output_prefix: "out/discrim".into(),
            base_path: "data".into(),
            base_url: "https://h/e".to_string(),
            urls: None,
            layout: SurveyLayout::Blocks,
            conditions: vec![Condition::new(0, 0, true), Condition::new(2, 0, false)],
            repeats: 1,
            questions_per_participant: None,
            first_question_id: 4,
            template_question_count: 2,
            elements: crate::config::ElementLayout::default(),
        }
    }

    #[test]
    fn all_conditions_survey_lists_every_pairing_in_url_order() {
        let cfg = small_config();
        let tpl = small_template();
        let assets = QuestionAssets {
            audio_player: HtmlTemplate::new("$url"),
            question_wrapper: None,
        };
        let mut urls = AudioUrls::new();
        for exp in ["sw_9_3_4_4_2", "sw_1_3_4_4_2"] {
            urls.insert(
                exp.to_string(),
                vec![format!("https://h/e/{}/0.wav", exp), format!("https://h/e/{}/0_indv.wav", exp)],
            );
        }
        let conversations: HashMap<String, Vec<Utterance>> = urls
            .keys()
            .map(|exp| (exp.clone(), in_memory_conversation(exp)))
            .collect();

        let built = SurveyBuilder::new(&cfg, &tpl, &assets, &urls, conversations)
            .build_all_conditions()
            .unwrap();

        assert_eq!(built.participant, ALL_CONDITIONS_SURVEY);
        assert_eq!(
            built.export_tags,
            vec!["Q0_sw_9_3_4_4_2", "Q1_sw_9_3_4_4_2", "Q0_sw_1_3_4_4_2", "Q1_sw_1_3_4_4_2"]
        );
        assert_eq!(built.survey_length, 6);

        // always flat, whatever the configured layout
        let elements = built.document["SurveyElements"].as_array().unwrap();
        let qids: Vec<&str> = elements[0]["Payload"][0]["BlockElements"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["QuestionID"].as_str())
            .collect();
        assert_eq!(qids, vec!["QID4", "QID5", "QID6", "QID7"]);
        assert_eq!(elements.len(), 2 + 8 + 4 + 1);
        assert_eq!(elements[14]["Element"], "RS");
        assert_eq!(elements[1]["Payload"]["Properties"]["Count"], 6);
        assert_eq!(elements[7]["SecondaryAttribute"], "6");

        let individual = &elements[10]["Payload"]["Choices"];
        assert_eq!(individual["1"]["Display"], "https://h/e/sw_9_3_4_4_2/0_indv.wav");
    }

    #[test]
    fn in_memory_source_reports_unknown_experiment() {
        let conversations: HashMap<String, Vec<Utterance>> = HashMap::new();
        assert!(conversations.load("sw_1_3_4_4_2").is_err());
    }

    #[test]
    fn missing_payload_is_a_template_error() {
        let err = question_set_up(&json!({"Element": "SQ"}), "SV", 1, "x").unwrap_err();
        assert!(matches!(err, SurveyError::Template(_)));
    }
}
