//! Human-readable alert messages.

use serde::Serialize;

use shiftwatch_core::AlertType;
use shiftwatch_notify::templating::TemplateRenderer;
use shiftwatch_notify::NotifyError;

use crate::stages::AlertCandidate;

const TEMPLATE_10MIN: &str = "{{ name }} est inactif depuis {{ minutes }} minutes{{ task }}";
const TEMPLATE_30MIN: &str =
    "⚠️ {{ name }} est inactif depuis {{ minutes }} minutes{{ task }} - Intervention recommandée";
const TEMPLATE_60MIN: &str = "🚨 CRITIQUE: {{ name }} est inactif depuis {{ minutes }} minutes{{ task }} - Intervention urgente requise";

const WITH_TASK: &str = " sur la tâche";
const WITHOUT_TASK: &str = " sans tâche assignée";

#[derive(Serialize)]
struct MessageContext<'a> {
    name: &'a str,
    minutes: i64,
    task: &'static str,
}

pub fn template_for(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::Inactivity10Min => TEMPLATE_10MIN,
        AlertType::Inactivity30Min => TEMPLATE_30MIN,
        AlertType::Inactivity60Min => TEMPLATE_60MIN,
    }
}

/// Render the stored `message` for a candidate.
pub fn render_alert_message(
    renderer: &TemplateRenderer,
    candidate: &AlertCandidate,
) -> Result<String, NotifyError> {
    let ctx = MessageContext {
        name: &candidate.employee_name,
        minutes: candidate.idle_minutes,
        task: if candidate.task_id.is_some() {
            WITH_TASK
        } else {
            WITHOUT_TASK
        },
    };
    renderer.render(template_for(candidate.alert_type), &ctx)
}
