use crate::archive::{self, Extractor, ZipExtractor};
use crate::auth::{AuthSession, Authenticator};
use crate::catalog::FoundProduct;
use crate::context::{Limits, RunContext};
use crate::error::{Error, Result};
use crate::product;
use crate::progress::TransferProgress;
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub identifier: String,
    pub server: String,
    pub url: String,
    pub archive_path: PathBuf,
    pub extracted_path: PathBuf,
}

impl DownloadTask {
    pub fn new(product: &FoundProduct, root: &Path, create_subdirs: bool) -> Result<Self> {
        let file_name = product
            .url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&product.identifier);
        let file_name = product::ensure_single_zip_extension(file_name);
        let dir = product::local_product_dir(root, &file_name, create_subdirs)?;
        let archive_path = dir.join(&file_name);
        Ok(DownloadTask {
            identifier: product.identifier.clone(),
            server: product.server.clone(),
            url: product.url.clone(),
            extracted_path: archive::extraction_dir(&archive_path),
            archive_path,
        })
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    pub fn from_products(products: &[FoundProduct], root: &Path, create_subdirs: bool) -> Result<Self> {
        let tasks = products
            .iter()
            .map(|p| DownloadTask::new(p, root, create_subdirs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tasks })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)
            .map_err(|e| Error::invalid_input(format!("malformed download plan: {e}")))?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn tasks(self: &Self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Tasks grouped by dissemination server, in plan order within a group.
    pub fn by_server(self: &Self) -> BTreeMap<&str, Vec<&DownloadTask>> {
        let mut groups: BTreeMap<&str, Vec<&DownloadTask>> = BTreeMap::new();
        for task in self.tasks.iter() {
            groups.entry(task.server.as_str()).or_default().push(task);
        }
        groups
    }

    /// Works through the files of one server at a time. A server is only
    /// logged in to once one of its files has to be fetched, and a failed
    /// login fails the files that needed it.
    pub async fn execute(self: &Self, ctx: &RunContext, policy: DownloadPolicy) -> DownloadSummary {
        let started = Instant::now();
        let mut summary = DownloadSummary::default();
        let mut counter = Counter::new(self.tasks.len());

        for (server, tasks) in self.by_server() {
            info!("Selecting dissemination service: {}", server);
            let session = ServerSession::new(server, ctx);
            download_tasks(&session, &ZipExtractor, &tasks, policy, &ctx.limits, &mut counter, &mut summary)
                .await;
            session.logout().await;
        }

        summary.elapsed = started.elapsed();
        summary
    }
}

/// User choices applied to every file.
#[derive(Debug, Clone, Copy)]
pub struct DownloadPolicy {
    pub overwrite: bool,
    pub unzip: bool,
    pub delete_after_unzip: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
    pub transfer_time: Duration,
    pub elapsed: Duration,
}

impl DownloadSummary {
    /// Mean transfer speed in bytes per second.
    pub fn mean_speed(self: &Self) -> Option<f64> {
        let secs = self.transfer_time.as_secs_f64();
        if self.bytes == 0 || secs <= 0.0 {
            return None;
        }
        Some(self.bytes as f64 / secs)
    }
}

pub trait FileFetcher {
    /// Fetches `url` into `dst`, returning the bytes transferred. `dst` only
    /// appears once the transfer is complete.
    async fn fetch(self: &Self, url: &str, dst: &Path) -> Result<u64>;
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

impl FileFetcher for AuthSession {
    async fn fetch(self: &Self, url: &str, dst: &Path) -> Result<u64> {
        fetch_with(self.client()?, url, dst).await
    }
}

/// Logs in to a dissemination server on the first fetch. The outcome of that
/// login is kept for the remaining files of the server.
struct ServerSession<'a> {
    server: &'a str,
    ctx: &'a RunContext,
    session: OnceCell<Option<AuthSession>>,
}

impl<'a> ServerSession<'a> {
    fn new(server: &'a str, ctx: &'a RunContext) -> Self {
        Self {
            server,
            ctx,
            session: OnceCell::new(),
        }
    }

    async fn session(self: &Self) -> Option<&AuthSession> {
        self.session
            .get_or_init(|| async move {
                let login = match Authenticator::new(self.server, &self.ctx.idp_host, &self.ctx.credentials) {
                    Ok(authenticator) => authenticator.login().await,
                    Err(e) => Err(e),
                };
                match login {
                    Ok(session) => Some(session),
                    Err(e) => {
                        error!("Login to {} failed: {}", self.server, e);
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn logout(self: Self) {
        match self.session.into_inner() {
            Some(Some(mut session)) => session.logout().await,
            Some(None) => {}
            None => debug!("No file needed {}, never logged in", self.server),
        }
    }
}

impl FileFetcher for ServerSession<'_> {
    async fn fetch(self: &Self, url: &str, dst: &Path) -> Result<u64> {
        match self.session().await {
            Some(session) => session.fetch(url, dst).await,
            None => Err(Error::BadResponse(format!("not logged in to {}", self.server))),
        }
    }
}

/// Streams `url` into the `.partial` sibling of `dst`, resuming from its
/// length, and renames it to `dst` once complete.
async fn fetch_with(client: &reqwest::Client, url: &str, dst: &Path) -> Result<u64> {
    let partial = partial_path(dst);
    let offset = fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);

    let mut request = client.get(url);
    if offset > 0 {
        debug!("Resuming {} from byte {}", partial.display(), offset);
        request = request.header(RANGE, format!("bytes={offset}-"));
    }
    let response = request.send().await?;

    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        return Err(Error::AccessDenied { url: url.to_string() });
    }
    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        fs::remove_file(&partial)?;
        return Err(Error::Io(std::io::Error::other(
            "partial download no longer matches the remote file",
        )));
    }
    let response = response.error_for_status()?;

    let append = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
    let offset = if append { offset } else { 0 };
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&partial)?;

    let prefix = dst
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.get(9..19))
        .unwrap_or("download");
    let progress = TransferProgress::new(response.content_length().map(|len| len + offset), prefix);
    progress.resume_from(offset);

    let mut transferred = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };
        file.write_all(&chunk)?;
        transferred += chunk.len() as u64;
        progress.step(chunk.len() as u64);
    }
    file.flush()?;
    progress.finish();

    fs::rename(&partial, dst)?;
    Ok(transferred)
}

/// Position in the overall file list, for log prefixes.
struct Counter {
    current: usize,
    total: usize,
}

impl Counter {
    fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    fn next(self: &mut Self) -> String {
        self.current += 1;
        let width = self.total.to_string().len();
        format!("[{:>width$}/{}]", self.current, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileOutcome {
    Skipped,
    Completed,
    Failed,
}

/// What is on disk for a task, re-read before every decision.
#[derive(Debug, Clone, Copy)]
struct LocalState {
    archive_exists: bool,
    extracted_exists: bool,
}

impl LocalState {
    fn observe(task: &DownloadTask) -> Self {
        Self {
            archive_exists: task.archive_path.exists(),
            extracted_exists: task.extracted_path.exists(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Actions {
    download: bool,
    unzip: bool,
}

impl Actions {
    fn decide(state: LocalState, policy: DownloadPolicy) -> Self {
        Self {
            download: policy.overwrite || (!state.archive_exists && !state.extracted_exists),
            unzip: policy.unzip && (policy.overwrite || !state.extracted_exists),
        }
    }

    fn is_idle(self: &Self) -> bool {
        !self.download && !self.unzip
    }
}

/// Drops an archive whose extraction is already on disk when archives are not
/// kept, then decides what the task still needs.
fn pending_actions(task: &DownloadTask, policy: DownloadPolicy, label: &str) -> (LocalState, Actions) {
    let state = LocalState::observe(task);
    if policy.delete_after_unzip && state.extracted_exists && state.archive_exists {
        info!("{} Removing archive already extracted: {}", label, task.archive_path.display());
        if let Err(e) = fs::remove_file(&task.archive_path) {
            warn!("{} Could not remove {}: {}", label, task.archive_path.display(), e);
        }
    }
    let state = LocalState::observe(task);
    (state, Actions::decide(state, policy))
}

async fn download_tasks(
    fetcher: &impl FileFetcher,
    extractor: &impl Extractor,
    tasks: &[&DownloadTask],
    policy: DownloadPolicy,
    limits: &Limits,
    counter: &mut Counter,
    summary: &mut DownloadSummary,
) {
    for task in tasks.iter() {
        let label = counter.next();
        match download_file(fetcher, extractor, task, policy, limits, &label, summary).await {
            FileOutcome::Skipped => summary.skipped += 1,
            FileOutcome::Completed => {}
            FileOutcome::Failed => summary.failed += 1,
        }
    }
}

async fn download_file(
    fetcher: &impl FileFetcher,
    extractor: &impl Extractor,
    task: &DownloadTask,
    policy: DownloadPolicy,
    limits: &Limits,
    label: &str,
    summary: &mut DownloadSummary,
) -> FileOutcome {
    info!("{} Starting: {}", label, task.identifier);

    if let Some(dir) = task.archive_path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            error!("{} Cannot create {}: {}", label, dir.display(), e);
            return FileOutcome::Failed;
        }
    }

    for attempt in 1..=limits.max_attempts {
        if attempt > 1 {
            info!("{} Restarting (attempt {} of max. {})", label, attempt, limits.max_attempts);
        }

        let (state, actions) = pending_actions(task, policy, label);
        if actions.is_idle() {
            info!("{} Skipped, already present: {}", label, task.identifier);
            return if attempt == 1 {
                FileOutcome::Skipped
            } else {
                FileOutcome::Completed
            };
        }

        if policy.overwrite && attempt == 1 {
            if let Err(e) = remove_existing(task) {
                warn!("{} Could not remove existing files: {}", label, e);
            }
        }

        // A retry keeps an archive fetched by an earlier attempt.
        let download = actions.download && !(attempt > 1 && state.archive_exists);

        let mut success = true;
        if download {
            let started = Instant::now();
            match fetcher.fetch(&task.url, &task.archive_path).await {
                Ok(bytes) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                    summary.transfer_time += started.elapsed();
                    info!("{} Downloaded {} ({} bytes)", label, task.archive_path.display(), bytes);
                }
                Err(e) if !e.is_retryable() => {
                    error!("{} {}", label, e);
                    return FileOutcome::Failed;
                }
                Err(e) => {
                    warn!(
                        "{} Download failed (attempt {}/{}): {}",
                        label, attempt, limits.max_attempts, e
                    );
                    if attempt < limits.max_attempts {
                        tokio::time::sleep(limits.retry_delay).await;
                    }
                }
            }
            success &= task.archive_path.exists();
        }

        if actions.unzip {
            if task.archive_path.exists() {
                match extractor.extract(
                    &task.archive_path,
                    policy.delete_after_unzip,
                    policy.delete_after_unzip,
                ) {
                    Ok(_) => summary.extracted += 1,
                    Err(e) => warn!("{} {}", label, e),
                }
            }
            success &= task.extracted_path.exists();
        }

        if success {
            return FileOutcome::Completed;
        }
    }

    error!("{} Giving up on {} after {} attempts", label, task.identifier, limits.max_attempts);
    FileOutcome::Failed
}

fn remove_existing(task: &DownloadTask) -> std::io::Result<()> {
    for file in [task.archive_path.clone(), partial_path(&task.archive_path)] {
        if file.exists() {
            fs::remove_file(&file)?;
        }
    }
    if task.extracted_path.exists() {
        fs::remove_dir_all(&task.extracted_path)?;
    }
    Ok(())
}
