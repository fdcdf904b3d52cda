//! `bdm pause|resume|stop|restart [INDEX]` – signal a running `bdm run`.

use anyhow::{Context, Result};

use crate::cli::control_socket::{self, ControlCommand, ControlVerb};

pub async fn run_control(verb: ControlVerb, index: Option<usize>) -> Result<()> {
    let path = bdm_core::control::default_control_socket_path().context("control socket path")?;
    control_socket::send_command(&path, ControlCommand { verb, index }).await?;
    match index {
        Some(index) => println!("Sent {verb} for job {index}"),
        None => println!("Sent {verb} for the batch"),
    }
    Ok(())
}
