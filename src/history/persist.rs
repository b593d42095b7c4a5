//! Saving and loading the history as a ZIP archive.
//!
//! Layout under a named group:
//!
//! ```text
//! <group>/history.json        {"length": n, "cursor": c, "maxSize": m}
//! <group>/0000/labels.npy     written values
//! <group>/0000/before.npy     labels replaced by the last application
//! <group>/0000/meta.json      {"axis", "slice", "labelNumber", "offsets",
//!                              "time", "erasing", "timestamp"}
//! ```

use std::io::{Read, Seek, Write};

use ndarray::Array5;
use ndarray_npy::{ReadNpyError, ReadNpyExt, WriteNpyError, WriteNpyExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{HistoryManager, LabelEdit};

/// Errors while writing or reading a saved history.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),

    #[error("failed to write array: {0}")]
    NpyWrite(#[from] WriteNpyError),

    #[error("failed to read array: {0}")]
    NpyRead(#[from] ReadNpyError),

    #[error("invalid metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// No history stored under the requested group
    #[error("no history group '{0}' in archive")]
    MissingGroup(String),

    /// An entry's parts do not fit together
    #[error("history entry {index}: {message}")]
    InvalidEntry { index: usize, message: String },

    /// Stored cursor lies outside the stored entries
    #[error("history cursor {cursor} out of range for {length} entries")]
    InvalidCursor { cursor: i64, length: usize },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryMeta {
    length: usize,
    /// -1 when every edit is undone
    cursor: i64,
    max_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryMeta {
    axis: usize,
    slice: usize,
    label_number: u8,
    offsets: [usize; 5],
    time: usize,
    erasing: bool,
    timestamp: f64,
}

fn write_npy<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: String,
    array: &Array5<u8>,
    options: SimpleFileOptions,
) -> Result<(), PersistError> {
    let mut bytes = Vec::new();
    array.write_npy(&mut bytes)?;
    zip.start_file(name, options)?;
    zip.write_all(&bytes)?;
    Ok(())
}

fn write_json<W: Write + Seek, T: Serialize>(
    zip: &mut ZipWriter<W>,
    name: String,
    value: &T,
    options: SimpleFileOptions,
) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    zip.start_file(name, options)?;
    zip.write_all(&bytes)?;
    Ok(())
}

fn read_npy<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Array5<u8>, PersistError> {
    let file = archive.by_name(name)?;
    Ok(Array5::<u8>::read_npy(file)?)
}

/// Number of `<group>/NNNN/meta.json` records in the archive.
fn count_entries<R: Read + Seek>(archive: &ZipArchive<R>, group: &str) -> usize {
    let prefix = format!("{}/", group);
    archive
        .file_names()
        .filter_map(|name| name.strip_prefix(&prefix)?.strip_suffix("/meta.json"))
        .filter(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        .count()
}

fn read_json<R: Read + Seek, T: for<'de> Deserialize<'de>>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<T, PersistError> {
    let file = archive.by_name(name)?;
    Ok(serde_json::from_reader(file)?)
}

impl HistoryManager {
    /// Write every entry under `group`. Returns the underlying writer.
    pub fn save_to_zip<W: Write + Seek>(&self, writer: W, group: &str) -> Result<W, PersistError> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let meta = HistoryMeta {
            length: self.entries.len(),
            cursor: self.applied as i64 - 1,
            max_size: self.max_size,
        };
        write_json(&mut zip, format!("{}/history.json", group), &meta, options)?;

        for (i, edit) in self.entries.iter().enumerate() {
            let prefix = format!("{}/{:04}", group, i);
            write_npy(&mut zip, format!("{}/labels.npy", prefix), &edit.labels, options)?;
            write_npy(&mut zip, format!("{}/before.npy", prefix), &edit.before, options)?;
            let meta = EntryMeta {
                axis: edit.axis,
                slice: edit.slice,
                label_number: edit.label_number,
                offsets: edit.offset,
                time: edit.time,
                erasing: edit.erasing,
                timestamp: edit.timestamp,
            };
            write_json(&mut zip, format!("{}/meta.json", prefix), &meta, options)?;
        }

        let writer = zip.finish()?;
        log::info!(
            "💾 Saved {} history entries under '{}'",
            self.entries.len(),
            group
        );
        Ok(writer)
    }

    /// Read a history saved by [`save_to_zip`](Self::save_to_zip). Keeps
    /// the newest `max_size` entries.
    pub fn load_from_zip<R: Read + Seek>(
        reader: R,
        group: &str,
        max_size: usize,
    ) -> Result<Self, PersistError> {
        let mut archive = ZipArchive::new(reader)?;
        let meta: HistoryMeta = match read_json(&mut archive, &format!("{}/history.json", group)) {
            Err(PersistError::Zip(ZipError::FileNotFound)) => {
                return Err(PersistError::MissingGroup(group.to_string()));
            }
            other => other?,
        };

        let present = count_entries(&archive, group);
        if meta.length != present {
            return Err(PersistError::InvalidEntry {
                index: present,
                message: format!("header lists {} entries, archive holds {}", meta.length, present),
            });
        }
        let applied = meta
            .cursor
            .checked_add(1)
            .and_then(|a| usize::try_from(a).ok())
            .filter(|&a| a <= present)
            .ok_or(PersistError::InvalidCursor {
                cursor: meta.cursor,
                length: present,
            })?;

        let mut entries = Vec::with_capacity(present);
        for index in 0..present {
            let prefix = format!("{}/{:04}", group, index);
            let labels = read_npy(&mut archive, &format!("{}/labels.npy", prefix))?;
            let before = read_npy(&mut archive, &format!("{}/before.npy", prefix))?;
            let m: EntryMeta = read_json(&mut archive, &format!("{}/meta.json", prefix))?;

            if m.axis >= 3 {
                return Err(PersistError::InvalidEntry {
                    index,
                    message: format!("axis {} is not a spatial axis", m.axis),
                });
            }
            if labels.shape() != before.shape() {
                return Err(PersistError::InvalidEntry {
                    index,
                    message: format!(
                        "labels {:?} and snapshot {:?} differ in shape",
                        labels.shape(),
                        before.shape()
                    ),
                });
            }
            entries.push(LabelEdit {
                axis: m.axis,
                slice: m.slice,
                time: m.time,
                offset: m.offsets,
                labels,
                before,
                erasing: m.erasing,
                label_number: m.label_number,
                timestamp: m.timestamp,
            });
        }

        let history = Self::from_parts(entries, applied, max_size);
        log::info!(
            "Loaded {} history entries from '{}' (cursor {:?})",
            history.len(),
            group,
            history.cursor()
        );
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DirectTarget;
    use crate::volume::{LabelStore, SliceSelectors, Volume, VolumeUpdate};
    use std::io::Cursor;

    fn edited() -> (HistoryManager, Volume, SliceSelectors) {
        let mut volume = Volume::zeros([1, 4, 4, 2, 1]);
        let mut slices = SliceSelectors::for_shape(volume.shape());
        let mut history = HistoryManager::new(100);
        for (x, label) in [(0, 1u8), (1, 2), (2, 3)] {
            let mut data = Array5::<u8>::zeros([1, 1, 2, 1, 1]);
            data.fill(label);
            let update = VolumeUpdate::new([0, x, 1, 1, 0], data, false);
            let target = DirectTarget {
                labels: &mut volume,
                slices: &mut slices,
            };
            let edit = LabelEdit::capture(&target, &update, 2, 1, label).unwrap();
            update.apply_to(&mut volume).unwrap();
            history.append(edit);
        }
        (history, volume, slices)
    }

    #[test]
    fn test_save_and_load() {
        let (mut history, mut volume, mut slices) = edited();
        let mut target = DirectTarget {
            labels: &mut volume,
            slices: &mut slices,
        };
        history.undo(&mut target).unwrap();

        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "labels/_history")
            .unwrap()
            .into_inner();
        let loaded =
            HistoryManager::load_from_zip(Cursor::new(bytes), "labels/_history", 100).unwrap();

        assert_eq!(loaded.entries(), history.entries());
        assert_eq!(loaded.cursor(), Some(1));
        assert!(loaded.can_redo());
    }

    #[test]
    fn test_loaded_history_can_undo() {
        let (history, mut volume, mut slices) = edited();
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "h")
            .unwrap()
            .into_inner();
        let mut loaded = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 100).unwrap();

        for _ in 0..3 {
            let mut target = DirectTarget {
                labels: &mut volume,
                slices: &mut slices,
            };
            assert!(loaded.undo(&mut target).unwrap());
        }
        assert!(volume.array().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_archive_layout() {
        let (history, _, _) = edited();
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "g")
            .unwrap()
            .into_inner();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert!(names.contains(&"g/0000/labels.npy".to_string()));
        assert!(names.contains(&"g/0002/meta.json".to_string()));

        let meta: serde_json::Value = read_json(&mut archive, "g/0001/meta.json").unwrap();
        assert_eq!(meta["labelNumber"], 2);
        assert_eq!(meta["offsets"], serde_json::json!([0, 1, 1, 1, 0]));
        assert_eq!(meta["erasing"], false);
    }

    #[test]
    fn test_missing_group() {
        let (history, _, _) = edited();
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "a")
            .unwrap()
            .into_inner();
        let err = HistoryManager::load_from_zip(Cursor::new(bytes), "b", 100).unwrap_err();
        assert!(matches!(err, PersistError::MissingGroup(ref g) if g == "b"));
    }

    /// Archive holding only a `history.json` with the given body.
    fn header_only(group: &str, json: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(format!("{}/history.json", group), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(json.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_huge_length_is_rejected() {
        let bytes = header_only(
            "h",
            r#"{"length": 4611686018427387904, "cursor": 0, "maxSize": 10}"#,
        );
        let err = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 10).unwrap_err();
        assert!(matches!(err, PersistError::InvalidEntry { index: 0, .. }));
    }

    #[test]
    fn test_length_must_match_entries() {
        let (history, _, _) = edited();
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "h")
            .unwrap()
            .into_inner();
        let mut source = ZipArchive::new(Cursor::new(bytes)).unwrap();
        for i in 0..source.len() {
            let file = source.by_index(i).unwrap();
            if file.name() == "h/history.json" {
                continue;
            }
            archive.raw_copy_file(file).unwrap();
        }
        archive
            .start_file("h/history.json", SimpleFileOptions::default())
            .unwrap();
        archive
            .write_all(br#"{"length": 5, "cursor": 2, "maxSize": 100}"#)
            .unwrap();
        let bytes = archive.finish().unwrap().into_inner();

        let err = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 100).unwrap_err();
        assert!(matches!(err, PersistError::InvalidEntry { index: 3, .. }));
    }

    #[test]
    fn test_cursor_out_of_range_is_rejected() {
        for cursor in [i64::MAX, -2, 1] {
            let json = format!(r#"{{"length": 0, "cursor": {}, "maxSize": 10}}"#, cursor);
            let bytes = header_only("h", &json);
            let err = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 10).unwrap_err();
            assert!(matches!(err, PersistError::InvalidCursor { length: 0, .. }));
        }
    }

    #[test]
    fn test_timestamp_survives_exactly() {
        let (mut history, _, _) = edited();
        history.entries[0].timestamp = 1792354569.4995575;
        history.entries[1].timestamp = 1792354569.4995577;
        history.entries[2].timestamp = 0.1 + 0.2;
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "h")
            .unwrap()
            .into_inner();
        let loaded = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 100).unwrap();
        for (a, b) in loaded.entries().iter().zip(history.entries()) {
            assert_eq!(a.timestamp.to_bits(), b.timestamp.to_bits());
        }
    }

    #[test]
    fn test_load_respects_max_size() {
        let (history, _, _) = edited();
        let bytes = history
            .save_to_zip(Cursor::new(Vec::new()), "h")
            .unwrap()
            .into_inner();
        let loaded = HistoryManager::load_from_zip(Cursor::new(bytes), "h", 2).unwrap();
        let labels: Vec<u8> = loaded.entries().iter().map(|e| e.label_number).collect();
        assert_eq!(labels, vec![2, 3]);
    }
}
