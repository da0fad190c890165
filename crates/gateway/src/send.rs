//! `POST /send-message`: validate a bulk-send form and start its task.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        extract::{Multipart, State, multipart::MultipartError},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    pairline_sessions::SessionId,
    pairline_whatsapp::{ChatAddress, TargetKind},
    tracing::info,
};

use crate::{error::GatewayError, state::GatewayState, tasks::BulkSendJob};

/// Response header carrying the started task's id.
pub const TASK_ID_HEADER: &str = "x-task-id";

/// Raw multipart fields, before validation.
#[derive(Debug, Default)]
pub struct SendForm {
    pub target: Option<String>,
    pub target_type: Option<String>,
    pub delay_sec: Option<String>,
    pub prefix: Option<String>,
    pub session: Option<String>,
    pub message_file: Option<Vec<u8>>,
}

impl SendForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(upload_error)?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "messageFile" {
                let bytes = field.bytes().await.map_err(upload_error)?;
                form.message_file = Some(bytes.to_vec());
                continue;
            }
            let slot = match name.as_str() {
                "target" => &mut form.target,
                "targetType" => &mut form.target_type,
                "delaySec" => &mut form.delay_sec,
                "prefix" => &mut form.prefix,
                "session" => &mut form.session,
                _ => continue,
            };
            let text = field.text().await.map_err(upload_error)?;
            *slot = Some(text);
        }
        Ok(form)
    }
}

fn upload_error(err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::UploadTooLarge
    } else {
        GatewayError::InvalidUpload(err.body_text())
    }
}

/// A validated form.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub address: ChatAddress,
    pub messages: Vec<String>,
    pub delay: Duration,
    pub session: Option<SessionId>,
    /// Raw file contents, persisted for the lifetime of the task.
    pub upload: Vec<u8>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TryFrom<SendForm> for SendRequest {
    type Error = GatewayError;

    fn try_from(form: SendForm) -> Result<Self, Self::Error> {
        let (Some(target), Some(delay), Some(file)) = (
            non_empty(&form.target),
            non_empty(&form.delay_sec),
            form.message_file.as_deref(),
        ) else {
            return Err(GatewayError::MissingFields);
        };

        let kind = match non_empty(&form.target_type) {
            Some(raw) => raw
                .parse::<TargetKind>()
                .map_err(|_| GatewayError::InvalidTargetType)?,
            None => TargetKind::default(),
        };
        let delay = parse_delay(delay)?;
        let session = non_empty(&form.session)
            .map(|raw| SessionId::parse(raw).ok_or(GatewayError::InvalidSessionId))
            .transpose()?;
        let text = std::str::from_utf8(file)
            .map_err(|_| GatewayError::InvalidUpload("message file is not UTF-8".into()))?;

        let address = ChatAddress::resolve(target, kind);
        let messages = split_messages(text, form.prefix.as_deref());

        Ok(Self {
            address,
            messages,
            delay,
            session,
            upload: form.message_file.unwrap_or_default(),
        })
    }
}

/// Parse a delay given in (possibly fractional) seconds.
pub fn parse_delay(raw: &str) -> Result<Duration, GatewayError> {
    let secs: f64 = raw.trim().parse().map_err(|_| GatewayError::InvalidDelay)?;
    Duration::try_from_secs_f64(secs).map_err(|_| GatewayError::InvalidDelay)
}

/// One message per non-empty line, with `prefix` and a space prepended when
/// the prefix is non-empty.
pub fn split_messages(text: &str, prefix: Option<&str>) -> Vec<String> {
    let prefix = prefix.filter(|p| !p.is_empty());
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| match prefix {
            Some(prefix) => format!("{prefix} {line}"),
            None => line.to_string(),
        })
        .collect()
}

pub async fn send_message_handler(
    State(state): State<Arc<GatewayState>>,
    multipart: Multipart,
) -> Result<Response, GatewayError> {
    let form = SendForm::from_multipart(multipart).await?;
    let request = SendRequest::try_from(form)?;
    let session = state.sessions.resolve(request.session.as_ref()).await?;

    let uploads_dir = &state.config.storage.uploads_dir;
    tokio::fs::create_dir_all(uploads_dir).await?;
    let upload_path = uploads_dir.join(format!("upload_{}.txt", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&upload_path, &request.upload).await?;

    let job = BulkSendJob {
        session_id: session.id.clone(),
        address: request.address,
        messages: request.messages,
        delay: request.delay,
        upload_path: Some(upload_path),
    };
    let task = state.tasks.start(job, session.client).await;
    info!(task = %task.id, session = %task.session_id, total = task.total, "bulk send accepted");

    Ok((
        StatusCode::ACCEPTED,
        [(TASK_ID_HEADER, task.id.clone())],
        format!("Started sending messages (task {})", task.id),
    )
        .into_response())
}
