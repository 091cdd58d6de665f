//! `dagflow types`: list registered node types.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub fn list_types(state: &AppState, json: bool) -> Result<()> {
    let types = state.registry().list_types();

    if json {
        let out = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "types": types,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  Node types ({}):", types.len());
    for name in types {
        println!("    {} {}", style("-").dim(), style(name).cyan());
    }
    println!();
    println!("  Data directory: {}", style(state.data_dir.display()).dim());
    println!();
    Ok(())
}
