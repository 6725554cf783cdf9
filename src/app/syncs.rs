//! Syncs wiring the messaging concepts to requests and to the assistant.

use std::sync::OnceLock;

use regex::Regex;

use crate::concept::requesting::{REQUEST, REQUESTING, RESPOND};
use crate::concept::QueryContext;
use crate::error::{SyncError, SyncResult, ValidationError};
use crate::frame::Frames;
use crate::pattern::{lit, var, ActionPattern, ActionTemplate};
use crate::sync::SyncRule;
use crate::value::Value;
use crate::{record, terms};

use super::assistant::ASSISTANT;
use super::conversing::CONVERSING;
use super::sessioning::SESSIONING;

/// Request path for posting a message.
pub const SEND_PATH: &str = "/conversations/send";
/// Handle that summons the assistant inside a message.
pub const ASSISTANT_HANDLE: &str = "Amimi";
/// User id the assistant posts its replies under.
pub const ASSISTANT_USER: &str = "amimi";

static MENTION: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn mention_regex() -> SyncResult<&'static Regex> {
    MENTION
        .get_or_init(|| Regex::new(&format!(r"(?i)@{ASSISTANT_HANDLE}\b")))
        .as_ref()
        .map_err(|e| SyncError::where_failed(format!("invalid mention pattern: {e}")))
}

/// Strips the assistant mention from `content`.
///
/// Returns `None` when the content does not mention the assistant.
#[must_use]
pub fn mention_prompt(content: &str) -> Option<String> {
    let re = mention_regex().ok()?;
    re.is_match(content)
        .then(|| re.replace_all(content, "").trim().to_string())
}

fn send_request() -> ActionPattern {
    ActionPattern::new(REQUESTING, REQUEST)
        .inputs(terms! {
            "path" => lit(SEND_PATH),
            "session" => var("session"),
            "conversation" => var("conversation"),
            "content" => var("content"),
        })
        .outputs(terms! { "request" => var("request") })
}

fn send_action() -> ActionPattern {
    ActionPattern::new(CONVERSING, "send").inputs(terms! {
        "conversation" => var("conversation"),
        "content" => var("content"),
    })
}

async fn session_user(frames: Frames, ctx: QueryContext) -> SyncResult<Frames> {
    frames
        .query(
            &ctx,
            SESSIONING,
            "_getUser",
            &terms! { "session" => var("session") },
            &terms! { "user" => var("user") },
        )
        .await
}

async fn without_session(frames: Frames, ctx: QueryContext) -> SyncResult<Frames> {
    let mut out = Frames::new();
    for frame in frames {
        let session = frame.resolve(&var("session"))?;
        let rows = ctx
            .query(SESSIONING, "_getUser", &record! { "session" => session })
            .await?;
        if rows.is_empty() {
            out.push(frame);
        }
    }
    Ok(out)
}

async fn mentions_assistant(frames: Frames, _ctx: QueryContext) -> SyncResult<Frames> {
    mention_regex()?;
    Ok(frames.bind("prompt", |f| {
        let content = f.get("content")?.as_str()?;
        mention_prompt(content).map(Value::from)
    }))
}

/// Every sync of the messaging app, in registration order.
pub fn rules() -> Result<Vec<SyncRule>, ValidationError> {
    Ok(vec![
        SyncRule::builder("SendRequest")
            .when(send_request())
            .where_fn(session_user)
            .binds(["user"])
            .then(ActionTemplate::new(CONVERSING, "send").inputs(terms! {
                "conversation" => var("conversation"),
                "sender" => var("user"),
                "content" => var("content"),
            }))
            .build()?,
        SyncRule::builder("SendUnauthorized")
            .when(send_request())
            .where_fn(without_session)
            .then(ActionTemplate::new(REQUESTING, RESPOND).inputs(terms! {
                "request" => var("request"),
                "status" => lit(401),
                "error" => lit("invalid session"),
            }))
            .build()?,
        SyncRule::builder("SendResponse")
            .when(send_request())
            .when(send_action().outputs(terms! { "message" => var("message") }))
            .then(ActionTemplate::new(REQUESTING, RESPOND).inputs(terms! {
                "request" => var("request"),
                "status" => lit(200),
                "message" => var("message"),
            }))
            .build()?,
        SyncRule::builder("SendErrorResponse")
            .when(send_request())
            .when(send_action().on_error(Some("error")))
            .then(ActionTemplate::new(REQUESTING, RESPOND).inputs(terms! {
                "request" => var("request"),
                "status" => lit(400),
                "error" => var("error"),
            }))
            .build()?,
        SyncRule::builder("MentionAssistant")
            .when(send_action().outputs(terms! { "message" => var("message") }))
            .where_fn(mentions_assistant)
            .binds(["prompt"])
            .then(ActionTemplate::new(ASSISTANT, "reply").inputs(terms! {
                "conversation" => var("conversation"),
                "prompt" => var("prompt"),
            }))
            .build()?,
        SyncRule::builder("PostAssistantReply")
            .when(
                ActionPattern::new(ASSISTANT, "reply")
                    .inputs(terms! { "conversation" => var("conversation") })
                    .outputs(terms! { "reply" => var("reply") }),
            )
            .then(ActionTemplate::new(CONVERSING, "send").inputs(terms! {
                "conversation" => var("conversation"),
                "sender" => lit(ASSISTANT_USER),
                "content" => var("reply"),
            }))
            .build()?,
    ])
}
