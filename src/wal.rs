use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

enum Entry {
    /// A decoded event and the bytes its record occupies.
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Truncated or corrupt record; nothing after it is trusted.
    Damaged(&'static str),
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_entry(reader: &mut impl Read) -> io::Result<Entry> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(Entry::End);
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(Entry::Damaged("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Ok(Entry::Damaged("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Entry::Damaged("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Entry::Event(event, 8 + len as u64)),
        Err(_) => Ok(Entry::Damaged("undecodable payload")),
    }
}

/// Intact prefix of a log file.
struct Scan {
    events: Vec<Event>,
    /// Byte length of the intact prefix.
    intact_len: u64,
    damage: Option<&'static str>,
}

fn scan(path: &Path) -> io::Result<Scan> {
    let mut scan = Scan {
        events: Vec::new(),
        intact_len: 0,
        damage: None,
    };
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(scan),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    loop {
        match read_entry(&mut reader)? {
            Entry::Event(event, size) => {
                scan.events.push(event);
                scan.intact_len += size;
            }
            Entry::End => break,
            Entry::Damaged(reason) => {
                scan.damage = Some(reason);
                break;
            }
        }
    }
    Ok(scan)
}

/// Append-only log of booking events, owned by the engine's writer task.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, where `len`
/// is the byte length of the bincode payload. Opening a log cuts off a
/// damaged tail (a crash mid-write) so later appends stay readable.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    records: Arc<AtomicU64>,
}

impl Wal {
    /// Open (or create) the log at `path` and return the events it holds.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let scan = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Some(reason) = scan.damage {
            tracing::warn!(
                path = %path.display(),
                kept = scan.events.len(),
                reason,
                "truncating damaged WAL tail"
            );
            file.set_len(scan.intact_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            records: Arc::new(AtomicU64::new(scan.events.len() as u64)),
        };
        Ok((wal, scan.events))
    }

    /// Live count of records in the log, readable from other tasks.
    pub fn record_counter(&self) -> Arc<AtomicU64> {
        self.records.clone()
    }

    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.write_batch([event])
    }

    /// Encode the events and commit them with a single fsync.
    pub fn write_batch<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> io::Result<()> {
        let mut written = 0u64;
        let mut encoded = Ok(());
        for event in events {
            if let Err(e) = encode_event(&mut self.writer, event) {
                encoded = Err(e);
                break;
            }
            written += 1;
        }
        // Flush even after a failed encode so no partial batch stays buffered.
        let synced = self.sync();
        encoded.and(synced)?;
        self.records.fetch_add(written, Ordering::AcqRel);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Replace the whole log with `events`: write and fsync a temp file,
    /// rename it over the log, then append to the new file.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_event(&mut tmp, event)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.records.store(events.len() as u64, Ordering::Release);
        Ok(())
    }
}
