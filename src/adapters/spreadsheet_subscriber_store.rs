use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::domain::{
    subscriber::Subscriber,
    subscriber_email::SubscriberEmail,
    subscriber_store::{Outcome, StoreError, SubscriberStore},
};

pub const HEADER: [&str; 2] = ["Email", "Subscription Date"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What to do when the spreadsheet on disk cannot be read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionPolicy {
    /// Start again from an empty sheet, overwriting the old file.
    #[default]
    Rebuild,
    /// Move the old file aside, then start again from an empty sheet.
    Backup,
    /// Refuse to write until someone fixes the file.
    Fail,
}

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Failed to read the spreadsheet.")]
    Read(#[from] csv::Error),
    #[error("Unexpected spreadsheet header {0:?}.")]
    Header(Vec<String>),
    #[error("Row {row} holds an invalid email: {reason}")]
    Email { row: usize, reason: String },
    #[error("Row {row} holds an invalid subscription date {value:?}.")]
    Date {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Subscribers kept in a single CSV sheet: a fixed header row followed by one row
/// per subscriber. Every save rewrites the whole sheet, so saves are serialized.
#[derive(Debug, Clone)]
pub struct SpreadsheetSubscriberStore {
    path: PathBuf,
    on_corruption: CorruptionPolicy,
    write_lock: Arc<Mutex<()>>,
}

impl SpreadsheetSubscriberStore {
    pub fn new(path: impl Into<PathBuf>, on_corruption: CorruptionPolicy) -> Self {
        Self {
            path: path.into(),
            on_corruption,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content of the sheet, header excluded. A corrupted sheet is reported
    /// as an error here whatever the policy, since nothing gets rebuilt on reads.
    #[tracing::instrument(name = "Load subscribers from the spreadsheet", skip(self))]
    pub async fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let guard = self.write_lock.clone().lock_owned().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            load_sheet(&path).map_err(StoreError::io)
        })
        .await
        .map_err(StoreError::unexpected)?
    }
}

#[async_trait]
impl SubscriberStore for SpreadsheetSubscriberStore {
    #[tracing::instrument(name = "Append a subscriber to the spreadsheet", skip(self))]
    async fn insert_if_absent(&self, email: &SubscriberEmail) -> Result<Outcome, StoreError> {
        // The guard moves into the blocking task: a cancelled caller must not release
        // the lock while the sheet is still being rewritten.
        let guard = self.write_lock.clone().lock_owned().await;
        let path = self.path.clone();
        let on_corruption = self.on_corruption;
        let email = email.clone();
        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            span.in_scope(|| append_if_absent(&path, on_corruption, email))
        })
        .await
        .map_err(StoreError::unexpected)?
    }
}

fn append_if_absent(
    path: &Path,
    on_corruption: CorruptionPolicy,
    email: SubscriberEmail,
) -> Result<Outcome, StoreError> {
    let mut subscribers = match load_sheet(path) {
        Ok(subscribers) => subscribers,
        Err(err) => recover(path, on_corruption, err)?,
    };

    let key = email.normalized();
    if subscribers
        .iter()
        .any(|subscriber| subscriber.email.normalized() == key)
    {
        tracing::info!("{} is already in the spreadsheet", email);
        return Ok(Outcome::Duplicate);
    }

    subscribers.push(Subscriber::new(email, Utc::now().trunc_subsecs(0)));
    write_sheet(path, &subscribers).map_err(StoreError::io)?;

    Ok(Outcome::Created)
}

fn recover(
    path: &Path,
    on_corruption: CorruptionPolicy,
    err: SheetError,
) -> Result<Vec<Subscriber>, StoreError> {
    match on_corruption {
        CorruptionPolicy::Rebuild => {
            tracing::warn!(
                "Spreadsheet {} is unreadable, starting a new one: {:?}",
                path.display(),
                err
            );
        }
        CorruptionPolicy::Backup => {
            let backup_path = backup_path_for(path);

            fs::rename(path, &backup_path).map_err(StoreError::io)?;
            tracing::warn!(
                "Spreadsheet {} is unreadable, moved to {} and starting a new one: {:?}",
                path.display(),
                backup_path.display(),
                err
            );
        }
        CorruptionPolicy::Fail => {
            tracing::error!("Spreadsheet {} is unreadable: {:?}", path.display(), err);
            return Err(StoreError::io(err));
        }
    }

    Ok(Vec::new())
}

fn backup_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("subscribers"));

    path.with_file_name(format!(
        "{}.corrupt-{}",
        file_name,
        Utc::now().format("%Y%m%d%H%M%S")
    ))
}

/// Reads every subscriber row. A missing or empty file is an empty sheet.
pub fn load_sheet(path: &Path) -> Result<Vec<Subscriber>, SheetError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SheetError::Read(err.into())),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);
    let mut records = reader.records();

    let header = match records.next() {
        None => return Ok(Vec::new()),
        Some(record) => record?,
    };
    if header.iter().ne(HEADER) {
        return Err(SheetError::Header(
            header.iter().map(String::from).collect(),
        ));
    }

    let mut subscribers = Vec::new();

    for (index, record) in records.enumerate() {
        let record = record?;
        // Header is row 1.
        let row = index + 2;
        let email = SubscriberEmail::parse(record[0].to_string())
            .map_err(|reason| SheetError::Email { row, reason })?;
        let subscribed_at = parse_timestamp(&record[1]).map_err(|source| SheetError::Date {
            row,
            value: record[1].to_string(),
            source,
        })?;

        subscribers.push(Subscriber::new(email, subscribed_at));
    }

    Ok(subscribers)
}

/// Replaces the sheet with `subscribers`. The content goes to a temporary file in the
/// same directory first, so readers see either the old sheet or the new one.
pub fn write_sheet(path: &Path, subscribers: &[Subscriber]) -> Result<(), io::Error> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;

    let mut file = NamedTempFile::new_in(directory)?;
    {
        let mut writer = csv::Writer::from_writer(file.as_file_mut());

        writer.write_record(HEADER)?;
        for subscriber in subscribers {
            writer.write_record([
                subscriber.email.as_ref(),
                subscriber
                    .subscribed_at
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
                    .as_str(),
            ])?;
        }
        writer.flush()?;
    }
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;

    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)?;

    Ok(Utc.from_utc_datetime(&naive))
}
