//! `watch`: run the bridge and print every mirror change until Ctrl-C.

use std::sync::Arc;

use tokio_stream::{StreamExt, StreamMap};

use moodo_core::{Controller, DeviceState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::{boxes, util};

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = util::bridge_config(global)?;
    if args.no_push {
        config.push_enabled = false;
    }

    let names = config.clone();
    let controller = Controller::new(config)?;
    controller.start().await?;

    let mut streams = StreamMap::new();
    for key in controller.store().keys() {
        if let Some(stream) = controller.subscribe(key) {
            streams.insert(key, stream.into_stream());
        }
    }

    if !global.quiet {
        eprintln!("Watching {} box(es), Ctrl-C to stop", streams.len());
    }

    let color = output::should_color(global.color);
    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            item = streams.next() => {
                let Some((key, state)) = item else { break Ok(()) };
                match render_change(global.output, &util::device_name(&names, key), &state, color) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    controller.shutdown().await;
    result
}

/// One change as a log line, a JSON line, or a YAML document.
fn render_change(
    format: OutputFormat,
    name: &str,
    state: &Arc<DeviceState>,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => Ok(change_line(name, state, color)),
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(state)?),
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml::to_string(state)?)),
    }
}

fn change_line(name: &str, state: &Arc<DeviceState>, color: bool) -> String {
    let at = output::local_time(state.updated_at, "%H:%M:%S", "--:--:--");
    let source = state.source.map_or_else(|| "-".into(), |s| s.to_string());

    format!(
        "[{at}] {} {name}: power {}, intensity {}%, capsules {} ({source})",
        state.key,
        output::power_label(state.powered, color),
        state.intensity,
        boxes::capsule_summary(state),
    )
}
