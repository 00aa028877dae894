use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::realm::Realm;

/// Write an iterator of serializable items to a JSONL file (one JSON object per line).
fn write_jsonl<T: Serialize>(path: &Path, items: impl Iterator<Item = T>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Dump the live realm to JSONL files in `output_dir`, creating it if needed.
///
/// Writes `nations.jsonl`, `members.jsonl`, `wars.jsonl` (active wars) and
/// `trades.jsonl` (live trades). Useful for offline inspection; the store
/// remains the durable copy.
pub fn flush_to_jsonl(realm: &Realm, output_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;

    write_jsonl(
        &output_dir.join("nations.jsonl"),
        realm.registry().list_all(),
    )?;
    write_jsonl(
        &output_dir.join("members.jsonl"),
        realm.registry().members(),
    )?;
    write_jsonl(&output_dir.join("wars.jsonl"), realm.wars().active())?;
    write_jsonl(&output_dir.join("trades.jsonl"), realm.trades().all())?;

    Ok(())
}
