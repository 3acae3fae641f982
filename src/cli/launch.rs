//! CLI launch command handler.

use std::sync::Arc;

use crate::launch::{LaunchEvent, LaunchRequest, Launcher, ProgressBus, StagedPipeline};

use super::LaunchArgs;

/// Handle `ember launch`.
pub async fn handle_launch(args: LaunchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let launcher = Launcher::new(ProgressBus::new(), Arc::new(StagedPipeline::default()));
    let mut events = launcher.bus().subscribe();

    let job = launcher.start(
        LaunchRequest::builder()
            .server(args.server)
            .memory_mb(args.memory_mb)
            .build(),
    )?;

    while let Some(event) = events.recv().await {
        if event.job() != job {
            continue;
        }
        match event {
            LaunchEvent::Progress {
                stage,
                percent,
                detail,
                ..
            } => match detail {
                Some(detail) => println!("[{percent:>3}%] {stage} — {detail}"),
                None => println!("[{percent:>3}%] {stage}"),
            },
            LaunchEvent::Log { line, .. } => println!("{line}"),
            LaunchEvent::Done { ok, error, .. } => {
                if ok {
                    println!("✔ Launch complete");
                } else {
                    eprintln!("✖ Launch failed: {}", error.unwrap_or_default());
                    std::process::exit(1);
                }
                break;
            }
        }
    }
    Ok(())
}
