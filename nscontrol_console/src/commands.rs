//! Console subcommand implementations.

use nscontrol::{
    Category, Control, MediaDelta, ObjectsDelta, ObserverDelta, ReferenceDelta, ScriptDelta,
    SettingsDelta, ShmControl, Side,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

type CmdResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Print arena usage.
pub fn status(control: &ShmControl) -> CmdResult<()> {
    let stats = control.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Broadcast one command on the queue channel.
pub fn send(control: &dyn Control, text: &str) -> CmdResult<usize> {
    let delivered = control.write(text.as_bytes())?;
    println!("delivered to {delivered} client(s)");
    Ok(delivered)
}

/// Push one command on the realtime ring.
pub fn send_rt(control: &dyn Control, text: &str) -> CmdResult<bool> {
    let accepted = control.write_rt(text.as_bytes())?;
    if accepted {
        println!("queued on realtime ring");
    } else {
        println!("realtime ring full, command dropped");
    }
    Ok(accepted)
}

/// Print incoming commands until `running` is cleared.
pub fn listen(
    control: &dyn Control,
    running: Arc<AtomicBool>,
    interval: Duration,
    with_rt: bool,
) -> CmdResult<usize> {
    control.connect()?;
    info!(client = %control.client_id(), "listening");

    let mut printed = 0;
    while running.load(Ordering::SeqCst) {
        let mut idle = true;
        while let Some(command) = control.read()? {
            println!("[cmd] {}", command.to_text());
            printed += 1;
            idle = false;
        }
        if with_rt {
            while let Some(command) = control.read_rt()? {
                println!("[rt]  {}", command.to_text());
                printed += 1;
                idle = false;
            }
        }
        if idle {
            std::thread::sleep(interval);
        }
    }

    control.disconnect()?;
    Ok(printed)
}

/// Snapshot of one category (or all of them) as JSON.
pub fn state_json(control: &ShmControl, category: Option<Category>, side: Side) -> CmdResult<Value> {
    let state = control.state(side)?;
    let value = match category {
        None => serde_json::to_value(state)?,
        Some(Category::Observer) => serde_json::to_value(state.observer)?,
        Some(Category::Media) => serde_json::to_value(state.media)?,
        Some(Category::Script) => serde_json::to_value(state.script)?,
        Some(Category::Reference) => serde_json::to_value(state.reference)?,
        Some(Category::Settings) => serde_json::to_value(state.settings)?,
        Some(Category::Objects) => serde_json::to_value(state.objects)?,
    };
    Ok(value)
}

/// Merge a JSON delta into one category of the write side. Returns the
/// number of fields written.
pub fn apply_delta(control: &dyn Control, category: Category, json: &str) -> CmdResult<usize> {
    let applied = match category {
        Category::Observer => control.set_observer(&serde_json::from_str::<ObserverDelta>(json)?)?,
        Category::Media => control.set_media(&serde_json::from_str::<MediaDelta>(json)?)?,
        Category::Script => control.set_script(&serde_json::from_str::<ScriptDelta>(json)?)?,
        Category::Reference => {
            control.set_reference(&serde_json::from_str::<ReferenceDelta>(json)?)?
        }
        Category::Settings => {
            control.set_settings(&serde_json::from_str::<SettingsDelta>(json)?)?
        }
        Category::Objects => control.set_objects(&serde_json::from_str::<ObjectsDelta>(json)?)?,
    };
    info!(%category, applied, "delta applied");
    Ok(applied)
}

/// Which shared list a command addresses.
#[derive(Debug, Clone, Copy)]
pub enum List {
    /// Language list
    Languages,
    /// Landscape list
    Landscapes,
}

/// Print a shared list, or replace it when `value` is given.
pub fn list(control: &dyn Control, which: List, value: Option<&str>) -> CmdResult<String> {
    if let Some(value) = value {
        // Accept comma separated input on the command line.
        let value = value.replace(',', "\n");
        match which {
            List::Languages => control.set_languages(&value)?,
            List::Landscapes => control.set_landscapes(&value)?,
        }
    }
    let current = match which {
        List::Languages => control.languages()?,
        List::Landscapes => control.landscapes()?,
    };
    for line in current.lines() {
        println!("{line}");
    }
    Ok(current)
}
