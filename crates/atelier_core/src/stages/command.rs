//! Construction of concrete stage jobs from project configuration.
//!
//! Texture and sprite stages become backend service jobs (workflow template
//! plus slot bindings); rigging, export and animation become subprocess
//! invocations of the configured tools.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::config::ToolSettings;
use crate::invoker::{ProcessJob, ServiceJob, StageJob};
use crate::models::{AnimationSelection, StageKind};
use crate::project::Project;

/// Workflow template for the texture stage.
pub const TEXTURE_WORKFLOW: &str = "texture_workflow.json";
/// Workflow template for the sprite stage.
pub const SPRITE_WORKFLOW: &str = "sprite_workflow.json";

/// Animation artifact file extension.
pub const ANIMATION_EXT: &str = "fbx";

/// Backend job for the texture stage.
pub fn texture_job(project: &Project, selected_models: &BTreeMap<String, String>) -> StageJob {
    let texture = &project.config.texture;

    let mut slots: BTreeMap<String, Value> = BTreeMap::new();
    slots.insert("prompt".to_string(), json!(texture.prompt));
    slots.insert(
        "negative_prompt".to_string(),
        json!(texture.negative_prompt),
    );
    slots.insert("seed".to_string(), json!(texture.seed));
    if let Some(image) = &texture.reference_image {
        slots.insert(
            "reference_image".to_string(),
            json!(project.root.join(image).to_string_lossy()),
        );
    }
    insert_model_slots(&mut slots, selected_models);

    StageJob::Service(ServiceJob {
        template: TEXTURE_WORKFLOW.to_string(),
        slots,
    })
}

/// Backend job for the sprite stage.
pub fn sprite_job(project: &Project, selected_models: &BTreeMap<String, String>) -> StageJob {
    let sprites = &project.config.sprites;

    let mut slots: BTreeMap<String, Value> = BTreeMap::new();
    slots.insert("prompt".to_string(), json!(sprites.prompt));
    slots.insert(
        "negative_prompt".to_string(),
        json!(sprites.negative_prompt),
    );
    slots.insert("resolution".to_string(), json!(sprites.resolution));
    slots.insert("frame_interval".to_string(), json!(sprites.frame_interval));
    slots.insert("camera_angles".to_string(), json!(sprites.camera_angles));
    slots.insert("spritesheet".to_string(), json!(sprites.spritesheet));
    insert_model_slots(&mut slots, selected_models);

    StageJob::Service(ServiceJob {
        template: SPRITE_WORKFLOW.to_string(),
        slots,
    })
}

/// Subprocess job for the rigging stage.
pub fn rig_job(project: &Project, tools: &ToolSettings) -> StageJob {
    render_engine_job(
        project,
        &tools.render_engine,
        &tools.rig_script,
        StageKind::Rigging,
    )
}

/// Subprocess job for the export stage.
pub fn export_job(project: &Project, tools: &ToolSettings) -> StageJob {
    render_engine_job(
        project,
        &tools.render_engine,
        &tools.export_script,
        StageKind::Export,
    )
}

/// Subprocess job for one animation batch item.
///
/// `artifact_stem` is decided by the batch scheduler (collision-safe).
pub fn animation_job(
    project: &Project,
    tools: &ToolSettings,
    selection: &AnimationSelection,
    artifact_stem: &str,
) -> StageJob {
    let output = project
        .stage_dir(StageKind::Animation)
        .join(format!("{}.{}", artifact_stem, ANIMATION_EXT));

    let mut args = vec![
        tools.motion_script.clone(),
        "--prompt".to_string(),
        selection.full_prompt(),
        "--output".to_string(),
        output.display().to_string(),
    ];
    if let Some(duration) = selection.duration_secs {
        args.push("--duration".to_string());
        args.push(duration.to_string());
    }
    if let Some(fps) = selection.fps {
        args.push("--fps".to_string());
        args.push(fps.to_string());
    }

    StageJob::Process(ProcessJob {
        program: tools.motion_engine.clone(),
        args,
        current_dir: None,
    })
}

/// Render-engine invocation: headless, running a tool script against the
/// project, writing into the stage directory.
fn render_engine_job(
    project: &Project,
    engine: &str,
    script: &str,
    stage: StageKind,
) -> StageJob {
    StageJob::Process(ProcessJob {
        program: engine.to_string(),
        args: vec![
            "--background".to_string(),
            "--python".to_string(),
            script.to_string(),
            "--".to_string(),
            "--project".to_string(),
            project.root.display().to_string(),
            "--output".to_string(),
            project.stage_dir(stage).display().to_string(),
        ],
        current_dir: None,
    })
}

fn insert_model_slots(slots: &mut BTreeMap<String, Value>, selected: &BTreeMap<String, String>) {
    for (slot, model) in selected {
        slots.insert(slot.clone(), json!(model));
    }
}
