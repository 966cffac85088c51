use std::path::Path;

use crate::commands::common::{
    change_to_list_item, format_change_lines, open_store, ChangeListItem,
};
use crate::error::CliError;

pub async fn run_changes(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let changes = store.all_local_changes().await?;

    if as_json {
        let json_items = changes
            .iter()
            .map(change_to_list_item)
            .collect::<Vec<ChangeListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("No pending local changes.");
        return Ok(());
    }

    for line in format_change_lines(&changes) {
        println!("{line}");
    }
    Ok(())
}
