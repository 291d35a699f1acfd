//! The fixed rule book every user session is compiled from.

use jaby_core::engine::{EngineError, FactTypes, Firing, Rule};
use jaby_core::fact::{AnswerChoice, Fact, FactKind, Flags, Knowledge, Message, Question};
use jaby_core::protocol::OutboundEvent;
use once_cell::sync::Lazy;
use regex::Regex;

/// Flag set once the session has asked its question.
pub const ASKED_QUESTION: &str = "asked_question";

/// Knowledge kind recorded for every answered question.
pub const ANSWERED_QUESTION: &str = "answered_question";

pub const QA_PROMPT: &str = "Does the QA function work?";

static HELLO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^hello(\s*world)?$").unwrap_or_else(|e| panic!("BUG: invalid hello pattern: {}", e))
});

/// Rules plus the fact types they are compiled against.
#[derive(Debug, Clone)]
pub struct RuleBook {
    pub rules: Vec<Rule>,
    pub fact_types: FactTypes,
}

impl RuleBook {
    pub fn new(rules: Vec<Rule>, fact_types: FactTypes) -> Self {
        Self { rules, fact_types }
    }

    /// The built-in conversation rules.
    pub fn core() -> Self {
        Self::new(
            vec![
                ask_question(),
                answer_question(),
                hello(),
                goodbye(),
                orphan_answer(),
                acknowledge(),
            ],
            FactTypes::all(),
        )
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::core()
    }
}

fn text(fact: &Fact) -> &str {
    fact.as_message().map(|m| m.text.as_str()).unwrap_or_default()
}

fn qa_question() -> Option<Question> {
    Question::new(
        QA_PROMPT,
        vec![
            AnswerChoice::new(123, "Testing One"),
            AnswerChoice::new(456, "Testing Two"),
            AnswerChoice::new(789, "Testing Three"),
        ],
    )
}

/// `hello` / `hello world` gets ` goodbye` appended.
fn hello() -> Rule {
    Rule::builder("Hello")
        .salience(10)
        .when(FactKind::Message, |fact| HELLO.is_match(text(fact)))
        .then(|firing| {
            let handle = firing.handle(0)?;
            let updated = format!("{} goodbye", text(firing.fact(0)?));
            firing.modify(handle, Fact::Message(Message::new(updated)));
            Ok(())
        })
}

fn goodbye() -> Rule {
    Rule::builder("Goodbye")
        .salience(5)
        .when(FactKind::Message, |fact| text(fact).ends_with("goodbye"))
        .then(|firing| {
            let said = text(firing.fact(0)?).to_string();
            tracing::info!(user_id = %firing.scope().user_id, message = %said, "goodbye");
            firing.emit(OutboundEvent::message(said));
            Ok(())
        })
}

/// Asks the QA question once per session. A question restored from storage
/// is asked again instead of creating a new one.
fn ask_question() -> Rule {
    Rule::builder("AskQuestion")
        .salience(20)
        .when(FactKind::Flags, |fact| {
            fact.as_flags().is_some_and(|flags| !flags.is_set(ASKED_QUESTION))
        })
        .produces([FactKind::Question])
        .then(|firing| {
            let handle = firing.handle(0)?;
            let mut flags: Flags = firing
                .fact(0)?
                .as_flags()
                .cloned()
                .unwrap_or_default();
            flags.set(ASKED_QUESTION);

            let question = match firing.memory().questions().next() {
                Some((_, pending)) => pending.clone(),
                None => {
                    let question = qa_question().ok_or_else(|| {
                        EngineError::rule_failed(firing.rule(), "QA question has no answers")
                    })?;
                    firing.assert(Fact::Question(question.clone()));
                    question
                }
            };

            firing.modify(handle, Fact::Flags(flags));
            firing.emit(OutboundEvent::question(&question));
            Ok(())
        })
}

fn answer_question() -> Rule {
    Rule::builder("AnswerQuestion")
        .salience(15)
        .matching([FactKind::Answer, FactKind::Question], |memory| {
            memory
                .answers()
                .flat_map(|(answer_handle, answer)| {
                    memory
                        .questions()
                        .filter(|(_, question)| question.id == answer.question_ref)
                        .map(move |(question_handle, _)| vec![answer_handle, question_handle])
                        .collect::<Vec<_>>()
                })
                .collect()
        })
        .produces([FactKind::Knowledge])
        .then(record_answer)
}

fn record_answer(firing: &mut Firing<'_>) -> Result<(), EngineError> {
    let answer_handle = firing.handle(0)?;
    let question_handle = firing.handle(1)?;
    let (Some(answer), Some(question)) = (
        firing.fact(0)?.as_answer().cloned(),
        firing.fact(1)?.as_question().cloned(),
    ) else {
        return Err(EngineError::rule_failed(firing.rule(), "binding is not (Answer, Question)"));
    };

    let mut knowledge = Knowledge::new(ANSWERED_QUESTION)
        .with_field("question_id", question.id.clone())
        .with_field("question", question.prompt.clone())
        .with_field("answer", answer.chosen_text.clone());
    match question.choice_by_text(&answer.chosen_text) {
        Some(choice) => knowledge = knowledge.with_field("choice", choice.id),
        None => {
            tracing::warn!(
                user_id = %firing.scope().user_id,
                question_id = %question.id,
                answer = %answer.chosen_text,
                "answer is not one of the candidates"
            );
        }
    }

    firing.emit(OutboundEvent::reply(format!(
        "You answered \"{}\" to \"{}\"",
        answer.chosen_text, question.prompt
    )));
    firing.assert(Fact::Knowledge(knowledge));
    firing.retract(answer_handle);
    firing.retract(question_handle);
    Ok(())
}

fn orphan_answer() -> Rule {
    Rule::builder("OrphanAnswer")
        .salience(-5)
        .when(FactKind::Answer, |_| true)
        .then(|firing| {
            let handle = firing.handle(0)?;
            if let Some(answer) = firing.fact(0)?.as_answer() {
                tracing::warn!(
                    user_id = %firing.scope().user_id,
                    question = %answer.question_ref,
                    answer = %answer.chosen_text,
                    "answer for unknown question dropped"
                );
            }
            firing.retract(handle);
            Ok(())
        })
}

fn acknowledge() -> Rule {
    Rule::builder("Acknowledge")
        .salience(-10)
        .when(FactKind::Message, |_| true)
        .then(|firing| {
            let handle = firing.handle(0)?;
            let said = text(firing.fact(0)?).to_string();
            firing.emit(OutboundEvent::reply(format!("Got the message: {}", said)));
            firing.retract(handle);
            Ok(())
        })
}
