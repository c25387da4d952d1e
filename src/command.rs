//! Serializable request/response boundary. Every command is answered with a
//! [`Response`]; errors and panics inside a handler never cross it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::WindowId;
use crate::detach::{ControlBarAction, DetachOptions};
use crate::engine::{Engine, ShowViewRequest};
use crate::error::{Result, Subject, WmError};
use crate::lifecycle::LifecycleStrategy;
use crate::view::{ViewConfig, ViewId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateMainWindow,
    CreateView {
        /// Defaults to the main window.
        #[serde(default)]
        window_id: Option<WindowId>,
        config: ViewConfig,
        #[serde(default)]
        persist_on_dismiss: bool,
    },
    ShowView(ShowViewRequest),
    SwitchToView {
        view_id: ViewId,
        #[serde(default)]
        window_id: Option<WindowId>,
    },
    CloseView {
        view_id: ViewId,
    },
    RemoveView {
        view_id: ViewId,
    },
    DetachView {
        view_id: ViewId,
        #[serde(default)]
        options: DetachOptions,
    },
    ReattachView {
        detached_window_id: WindowId,
    },
    ControlBar {
        window_id: WindowId,
        action: ControlBarAction,
    },
    ResizeWindow {
        height: u32,
    },
    ShowWindow,
    HideWindow,
    GetViewInfo {
        view_id: ViewId,
    },
    GetAllViews,
    GetStatistics,
    GetPerformanceMetrics,
    CleanupBackgroundViews,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateMainWindow => "create_main_window",
            Command::CreateView { .. } => "create_view",
            Command::ShowView(_) => "show_view",
            Command::SwitchToView { .. } => "switch_to_view",
            Command::CloseView { .. } => "close_view",
            Command::RemoveView { .. } => "remove_view",
            Command::DetachView { .. } => "detach_view",
            Command::ReattachView { .. } => "reattach_view",
            Command::ControlBar { .. } => "control_bar",
            Command::ResizeWindow { .. } => "resize_window",
            Command::ShowWindow => "show_window",
            Command::HideWindow => "hide_window",
            Command::GetViewInfo { .. } => "get_view_info",
            Command::GetAllViews => "get_all_views",
            Command::GetStatistics => "get_statistics",
            Command::GetPerformanceMetrics => "get_performance_metrics",
            Command::CleanupBackgroundViews => "cleanup_background_views",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

impl From<&WmError> for Response {
    fn from(err: &WmError) -> Self {
        Response::failed(err.kind(), err.to_string())
    }
}

fn to_data<T: Serialize>(value: T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(error = %err, "response payload not serializable");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Engine {
    /// Run one command. Failures, including panics in the handler, come back
    /// as `success: false`.
    pub async fn execute(self: &Arc<Self>, command: Command) -> Response {
        let name = command.name();
        tracing::debug!(command = name, "dispatching");
        match AssertUnwindSafe(self.dispatch(command)).catch_unwind().await {
            Ok(Ok(data)) => Response::ok(data),
            Ok(Err(err)) => {
                tracing::warn!(command = name, error = %err, "command failed");
                Response::from(&err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command = name, panic = %message, "command panicked");
                Response::failed("internal", message)
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, command: Command) -> Result<Option<Value>> {
        let data = match command {
            Command::CreateMainWindow => to_data(self.create_main_window().await?),
            Command::CreateView {
                window_id,
                config,
                persist_on_dismiss,
            } => {
                let window = match window_id {
                    Some(w) => w,
                    None => self
                        .main_window()
                        .ok_or(WmError::NotFound(Subject::Window(WindowId(0))))?,
                };
                let strategy = LifecycleStrategy::infer(persist_on_dismiss, &self.config().lifecycle);
                to_data(self.create_view(window, config, Some(strategy)).await?)
            }
            Command::ShowView(request) => to_data(self.show_view(request).await?),
            Command::SwitchToView { view_id, window_id } => {
                self.switch_to_view(&view_id, window_id).await?;
                None
            }
            Command::CloseView { view_id } => to_data(self.close_view(&view_id).await?),
            Command::RemoveView { view_id } => to_data(self.remove_view(&view_id).await?),
            Command::DetachView { view_id, options } => {
                to_data(self.detach_view(&view_id, options).await?)
            }
            Command::ReattachView { detached_window_id } => {
                self.reattach_view(detached_window_id).await?;
                None
            }
            Command::ControlBar { window_id, action } => {
                self.control_bar_action(window_id, action).await?;
                None
            }
            Command::ResizeWindow { height } => {
                self.request_resize(height);
                None
            }
            Command::ShowWindow => {
                self.show_main_window()?;
                None
            }
            Command::HideWindow => {
                self.hide_main_window()?;
                None
            }
            Command::GetViewInfo { view_id } => {
                let info = self
                    .view_info(&view_id)
                    .ok_or(WmError::NotFound(Subject::View(view_id)))?;
                to_data(info)
            }
            Command::GetAllViews => to_data(self.all_views()),
            Command::GetStatistics => to_data(self.statistics()),
            Command::GetPerformanceMetrics => to_data(self.performance_metrics()),
            Command::CleanupBackgroundViews => to_data(self.cleanup_background_views()),
        };
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: Command = serde_json::from_str(indoc! {r#"
            {
                "command": "show_view",
                "category": "plugin",
                "path": "/plugins/calc",
                "source": { "kind": "url", "location": "app://calc" },
                "persist_on_dismiss": true
            }
        "#})
        .unwrap();
        let Command::ShowView(request) = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(request.view_id(), ViewId::from("plugin:/plugins/calc"));
        assert!(request.persist_on_dismiss);
        assert!(!request.force_new);

        let cmd: Command =
            serde_json::from_str(r#"{"command":"reattach_view","detached_window_id":3}"#).unwrap();
        assert_eq!(
            cmd,
            Command::ReattachView {
                detached_window_id: WindowId(3)
            }
        );
    }

    #[test]
    fn error_responses_carry_kind() {
        let err = WmError::NotFound(Subject::View(ViewId::from("x")));
        let resp = Response::from(&err);
        assert!(!resp.success);
        assert_eq!(resp.error_kind(), Some("not_found"));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
