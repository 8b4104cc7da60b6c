//! 报告生成（无状态）

use crate::api::models::{AnomalyEventDto, ApiError};
use crate::core::config::MissionInfo;
use crate::core::report::ReportRenderer;
use crate::core::session::AnomalyEvent;
use chrono::Local;

/// 从任意事件列表生成 PDF
///
/// ```dart
/// final pdf = await renderReport(events: session.anomalyLog(), mission: mission, modelLabel: "Custom YOLOv8s");
/// ```
#[flutter_rust_bridge::frb]
pub fn render_report(
    events: Vec<AnomalyEventDto>,
    mission: MissionInfo,
    model_label: String,
) -> Result<Vec<u8>, ApiError> {
    let events: Vec<AnomalyEvent> = events.into_iter().map(AnomalyEvent::from).collect();
    let renderer = ReportRenderer::new(mission, model_label);
    Ok(renderer.render(&events, Local::now().naive_local())?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn default_mission() -> MissionInfo {
    MissionInfo::default()
}
