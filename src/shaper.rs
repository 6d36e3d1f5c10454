use anyhow::{Context, Result};
use tokio::process::{Child, Command};

/// Launch the external traffic shaper. Its exit is the relay's ordinary
/// shutdown signal, so the caller keeps the child handle and awaits it.
pub fn launch(path: &str) -> Result<Child> {
    let mut command = Command::new(path);

    // The shaper is a GUI-less companion on Windows; keep its console hidden.
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let child = command
        .spawn()
        .with_context(|| format!("failed to start traffic shaper {}", path))?;

    Ok(child)
}
