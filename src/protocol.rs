//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::AttemptView;
use crate::authoring::AuthoringForm;
use crate::catalog::{Catalog, OTHER};
use crate::domain::{Task, TaskField, TaskType};
use crate::progression::{ProgressSummary, Student, TaskStatus, TimeDisplay, ViewState, AVATAR_IDS};
use crate::review::{ReviewView, TimePolicy};
use crate::session::{Screen, Session, StudentPlay};

/// Messages the client can send over WebSocket. All of them act on the attached session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Attach {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    State,
    Start {
        name: String,
        #[serde(rename = "avatarId")]
        avatar_id: Option<u8>,
    },
    Select {
        index: usize,
    },
    Skip,
    Next,
    Hint,
    TextDraft {
        text: String,
    },
    StageImage {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    StartRecording {
        #[serde(rename = "microphoneAvailable", default = "yes")]
        microphone_available: bool,
    },
    AudioChunk {
        data: String,
    },
    StopRecording {
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
    },
    Submit,
    Reset,
}

fn yes() -> bool {
    true
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Attached {
        session: SessionOut,
    },
    State {
        session: SessionOut,
    },
    Hint {
        text: String,
    },
    AudioAck,
    Error {
        message: String,
    },
}

/// Session snapshot used by both WS and HTTP. Exactly one of the screen blocks is set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: Uuid,
    pub screen: &'static str,
    pub has_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authoring: Option<AuthoringOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoringOut {
    /// The form as last submitted, with the credential blanked.
    pub form: AuthoringForm,
    pub generating: bool,
    pub error: Option<String>,
}

/// Task as the student sees it: no validation prompt, no grading criteria.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTaskOut {
    pub id: u32,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub status: TaskStatus,
    pub has_hint: bool,
}

impl StudentTaskOut {
    fn new(task: &Task, status: TaskStatus) -> Self {
        Self {
            id: task.id,
            description: task.description.clone(),
            kind: task.kind,
            status,
            has_hint: task.hint.as_deref().is_some_and(|h| !h.trim().is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOut {
    pub title: String,
    pub story: String,
    pub view: ViewState,
    pub student: Option<Student>,
    pub avatars: [u8; 4],
    pub tasks: Vec<StudentTaskOut>,
    pub active_index: usize,
    pub accepts_answers: bool,
    pub attempt: Option<AttemptView>,
    pub time: Option<TimeDisplay>,
    pub time_limit_in_seconds: Option<u32>,
    pub summary: ProgressSummary,
}

fn student_out(play: &StudentPlay) -> StudentOut {
    let p = &play.progression;
    let quest = p.quest();
    StudentOut {
        title: quest.title.clone(),
        story: quest.story.clone(),
        view: p.view(),
        student: p.student().cloned(),
        avatars: AVATAR_IDS,
        tasks: quest
            .tasks
            .iter()
            .zip(p.statuses())
            .map(|(t, s)| StudentTaskOut::new(t, *s))
            .collect(),
        active_index: p.active_index(),
        accepts_answers: p.accepts_answers(),
        attempt: play.attempt().map(|a| a.view()),
        time: p.time_display(),
        time_limit_in_seconds: quest.time_limit_in_seconds,
        summary: p.summary(),
    }
}

/// Convert the internal session to the public DTO.
pub fn to_out(s: &Session) -> SessionOut {
    let mut out = SessionOut {
        session_id: s.id,
        screen: s.screen.name(),
        has_api_key: s.has_api_key(),
        authoring: None,
        review: None,
        student: None,
    };
    match &s.screen {
        Screen::Authoring(a) => {
            out.authoring = Some(AuthoringOut {
                form: AuthoringForm { api_key: String::new(), ..a.form.clone() },
                generating: a.generating,
                error: a.error.clone(),
            })
        }
        Screen::Review(r) => out.review = Some(r.view()),
        Screen::Student(p) => out.student = Some(student_out(p)),
    }
    out
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOut<'a> {
    #[serde(flatten)]
    pub catalog: &'a Catalog,
    pub other: &'static str,
    pub default_topic: &'a str,
    pub default_location: &'a str,
}

impl<'a> From<&'a Catalog> for CatalogOut<'a> {
    fn from(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            other: OTHER,
            default_topic: catalog.default_topic(),
            default_location: catalog.default_location(),
        }
    }
}

#[derive(Deserialize)]
pub struct TaskEditIn {
    pub field: TaskField,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePolicyIn {
    pub policy: TimePolicy,
    #[serde(default)]
    pub custom_minutes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartIn {
    pub name: String,
    #[serde(default)]
    pub avatar_id: Option<u8>,
}

#[derive(Deserialize)]
pub struct SelectIn {
    pub index: usize,
}

#[derive(Deserialize)]
pub struct DraftIn {
    pub text: String,
}

/// Base64 upload; a `data:` URL prefix is accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaIn {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse() {
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"start_recording"}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::StartRecording { microphone_available: true }));
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"stage_image","mimeType":"image/png","data":"AA=="}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::StageImage { .. }));
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"select","index":2}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::Select { index: 2 }));
    }

    #[test]
    fn authoring_snapshot_hides_credential() {
        let cat = Catalog::builtin();
        let mut s = Session::new(&cat);
        let form = AuthoringForm::with_defaults(&cat, Some("secret"));
        s.begin_draft(form).expect("begin");
        let v = serde_json::to_value(to_out(&s)).expect("serialize");
        assert_eq!(v["screen"], "authoring");
        assert_eq!(v["hasApiKey"], true);
        assert_eq!(v["authoring"]["generating"], true);
        assert_eq!(v["authoring"]["form"]["apiKey"], "");
        assert!(v.get("student").is_none());
    }

    #[test]
    fn catalog_out_flattens_tables() {
        let cat = Catalog::builtin();
        let v = serde_json::to_value(CatalogOut::from(&cat)).expect("serialize");
        assert_eq!(v["topics"].as_array().map(Vec::len), Some(43));
        assert_eq!(v["other"], "Other");
        assert_eq!(v["defaultLocation"], "Ngoài sân trường");
    }
}
