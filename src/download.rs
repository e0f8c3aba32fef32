use crate::mirror::{MirrorClient, SetInfo};
use eyre::{eyre, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::Response;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const VALID_PUNCTUATION: &str = "-_.() ";
const PATH_HOSTILE: &str = "<>:\"/\\|?*";

/// Maps any character outside ASCII letters, digits and `-_.() ` to `_`, then drops
/// anything that could still break a path on Windows.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || VALID_PUNCTUATION.contains(c) {
                c
            } else {
                '_'
            }
        })
        .filter(|c| !PATH_HOSTILE.contains(*c))
        .collect()
}

/// Drops repeated ids, keeping the first occurrence of each.
pub fn unique_ids(ids: Vec<u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub id: u32,
    pub filename: String,
    pub path: PathBuf,
}

impl DownloadJob {
    pub fn new(id: u32, info: &SetInfo, folder: &Path) -> DownloadJob {
        let filename = format!(
            "{}.osz",
            sanitize_filename(&format!("{} - {}", info.artist, info.title))
        );
        let path = folder.join(&filename);

        DownloadJob { id, filename, path }
    }
}

/// Appends ` (2)`, ` (3)`, ... to the file stem until the path is not claimed by an
/// earlier job of this run. Archives left on disk by earlier runs are overwritten.
fn unique_path(path: PathBuf, claimed: &HashSet<PathBuf>) -> Result<PathBuf> {
    if !claimed.contains(&path) {
        return Ok(path);
    }

    let filename = path
        .file_stem()
        .ok_or(eyre!("Could not get filename from path."))?
        .to_string_lossy();
    let extension = path
        .extension()
        .ok_or(eyre!("Could not get extension from path."))?
        .to_string_lossy();

    let mut i = 2;

    while claimed.contains(&path.with_file_name(format!("{} ({}).{}", filename, i, extension))) {
        i += 1;
    }

    let final_path = path.with_file_name(format!("{} ({}).{}", filename, i, extension));
    Ok(final_path)
}

/// Looks up every id on the mirror, one job per id, in the order given, waiting
/// `delay` between lookups.
pub async fn resolve_jobs(
    mirror: &MirrorClient,
    ids: &[u32],
    folder: &Path,
    delay: Duration,
    multibar: &MultiProgress,
) -> Result<Vec<DownloadJob>> {
    let bar = multibar.add(ProgressBar::new(ids.len() as u64));
    bar.set_style(
        ProgressStyle::with_template("Resolving: {bar:40.cyan/blue} {human_pos:>5} / {human_len:<5}")
            .expect("Failed to create resolve progress bar style!!")
            .progress_chars("##-"),
    );

    let mut claimed = HashSet::new();
    let mut jobs = Vec::with_capacity(ids.len());

    for (i, &id) in ids.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let info = mirror.set_info(id).await?;
        let mut job = DownloadJob::new(id, &info, folder);

        job.path = unique_path(job.path, &claimed)?;
        if let Some(name) = job.path.file_name() {
            job.filename = name.to_string_lossy().to_string();
        }
        claimed.insert(job.path.clone());

        debug!(id, filename = %job.filename, "Resolved beatmap set");
        jobs.push(job);
        bar.inc(1);
    }

    bar.finish_and_clear();
    multibar.remove(&bar);

    Ok(jobs)
}

/// Streams the body to `path`, advancing `bar` by each chunk. Fails before creating
/// the file when the response has no Content-Length.
async fn download_file(mut response: Response, path: &Path, bar: &ProgressBar) -> Result<u64> {
    let total_bytes = response
        .content_length()
        .ok_or_else(|| eyre!("Response for {} had no Content-Length.", response.url()))?;
    bar.set_length(total_bytes);

    let mut dest = File::create(path)
        .await
        .wrap_err_with(|| format!("Failed to create {}.", path.display()))?;

    let mut written = 0;
    while let Some(chunk) = response.chunk().await? {
        dest.write_all(&chunk).await?;
        written += chunk.len() as u64;
        bar.set_position(written);
    }
    dest.flush().await?;

    Ok(written)
}

async fn download_set(
    mirror: &MirrorClient,
    job: &DownloadJob,
    multibar: &MultiProgress,
    master_bar: &ProgressBar,
) -> Result<()> {
    let bar = multibar.insert_from_back(1, ProgressBar::new(0));
    bar.set_prefix(job.filename.clone());
    bar.set_style(
        ProgressStyle::with_template(
            "{prefix:40!} {bar:40.cyan/blue} {percent:>3}% {bytes:>10} / {total_bytes:<10}",
        )
        .expect("Failed to create progress bar style!!")
        .progress_chars("##-"),
    );

    let response = mirror.download(job.id).await?;
    let written = download_file(response, &job.path, &bar)
        .await
        .wrap_err_with(|| format!("Failed to download {}.", job.filename))?;

    multibar.remove(&bar);
    multibar.println(format!("Downloaded {}", job.filename))?;
    master_bar.inc(1);
    debug!(id = job.id, bytes = written, "Download done");

    Ok(())
}

/// Downloads the jobs one after another once `approve` accepts them, waiting `delay`
/// between downloads. Returns how many archives were written.
pub async fn download_all<F>(
    mirror: &MirrorClient,
    jobs: &[DownloadJob],
    delay: Duration,
    multibar: &MultiProgress,
    approve: F,
) -> Result<usize>
where
    F: FnOnce(&[DownloadJob]) -> Result<bool>,
{
    if !approve(jobs)? {
        info!("Download canceled, nothing was written.");
        return Ok(0);
    }

    let master_bar = multibar.add(ProgressBar::new(jobs.len() as u64));
    master_bar.set_style(
        ProgressStyle::with_template("Total: {bar:79.cyan/blue} {human_pos:>5} / {human_len:<5}")
            .expect("Failed to create master progress bar style!!")
            .progress_chars("##-"),
    );

    for (i, job) in jobs.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        download_set(mirror, job, multibar, &master_bar).await?;
    }

    master_bar.finish();

    Ok(jobs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::fake;
    use indicatif::ProgressDrawTarget;
    use reqwest::Client;
    use std::fs;
    use std::sync::atomic::Ordering;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn info(artist: &str, title: &str) -> SetInfo {
        SetInfo {
            artist: artist.to_owned(),
            title: title.to_owned(),
        }
    }

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_filename("xi - Blue Zenith"), "xi - Blue Zenith");
        assert_eq!(sanitize_filename("a/b\\c:d*e?f"), "a_b_c_d_e_f");
        assert_eq!(sanitize_filename("Camellia & Nanahira!"), "Camellia _ Nanahira_");
        assert_eq!(sanitize_filename("(feat. x) [TV Size]"), "(feat. x) _TV Size_");
    }

    #[test]
    fn sanitize_maps_each_non_ascii_char_to_one_underscore() {
        assert_eq!(sanitize_filename("ナナヒラ"), "____");
        assert_eq!(sanitize_filename("Café"), "Caf_");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for name in [
            "",
            "plain",
            "<>:\"/\\|?*",
            "DECO*27 - Rabbit Hole",
            "t+pazolite - Oshama Scramble!",
            "\u{1F980} crab\ttab",
        ] {
            let once = sanitize_filename(name);
            assert_eq!(sanitize_filename(&once), once);
            assert!(!once.chars().any(|c| PATH_HOSTILE.contains(c)));
        }
    }

    #[test]
    fn unique_ids_keeps_first_occurrence_order() {
        assert_eq!(unique_ids(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn job_names_archive_after_artist_and_title() {
        let job = DownloadJob::new(39804, &info("xi", "FREEDOM DiVE"), Path::new("songs"));
        assert_eq!(job.filename, "xi - FREEDOM DiVE.osz");
        assert_eq!(job.path, Path::new("songs").join("xi - FREEDOM DiVE.osz"));
    }

    #[test]
    fn unique_path_only_avoids_paths_claimed_this_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a - b.osz");
        fs::write(&path, b"old").unwrap();

        assert_eq!(unique_path(path.clone(), &HashSet::new()).unwrap(), path);

        let mut claimed = HashSet::new();
        claimed.insert(path.clone());
        claimed.insert(dir.path().join("a - b (2).osz"));

        assert_eq!(
            unique_path(path, &claimed).unwrap(),
            dir.path().join("a - b (3).osz")
        );
    }

    #[tokio::test]
    async fn rerun_overwrites_the_same_archive() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let multibar = hidden();

        for _ in 0..2 {
            let jobs = resolve_jobs(&mirror, &[7], dir.path(), Duration::ZERO, &multibar)
                .await
                .unwrap();
            assert_eq!(jobs[0].filename, "Artist 7 - Title_ 7_.osz");
            download_all(&mirror, &jobs, Duration::ZERO, &multibar, |_| Ok(true))
                .await
                .unwrap();
        }

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(
            fs::read(dir.path().join("Artist 7 - Title_ 7_.osz")).unwrap(),
            fake::archive(7)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_lookups_are_spaced_by_delay() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let delay = Duration::from_secs(5);

        let start = tokio::time::Instant::now();
        let jobs = resolve_jobs(&mirror, &[1, 2, 3, 4], dir.path(), delay, &hidden())
            .await
            .unwrap();

        assert_eq!(jobs.len(), 4);
        assert!(start.elapsed() >= delay * 3);
    }

    #[tokio::test]
    async fn resolves_one_job_per_id_in_order() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();

        let ids = [7, 3, 12];
        let jobs = resolve_jobs(&mirror, &ids, dir.path(), Duration::ZERO, &hidden())
            .await
            .unwrap();

        assert_eq!(jobs.iter().map(|job| job.id).collect::<Vec<_>>(), ids);
        assert_eq!(jobs[0].filename, "Artist 7 - Title_ 7_.osz");
        assert_eq!(jobs[2].path, dir.path().join("Artist 12 - Title_ 12_.osz"));
    }

    #[tokio::test]
    async fn same_name_sets_get_distinct_paths() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();

        let ids = [fake::DUPLICATE_NAME, fake::DUPLICATE_NAME + 1];
        let jobs = resolve_jobs(&mirror, &ids, dir.path(), Duration::ZERO, &hidden())
            .await
            .unwrap();

        assert_eq!(jobs[0].filename, "Same - Song.osz");
        assert_eq!(jobs[1].filename, "Same - Song (2).osz");
    }

    #[tokio::test]
    async fn missing_set_aborts_resolution() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();

        let ids = [1, fake::MISSING, 2];
        let result = resolve_jobs(&mirror, &ids, dir.path(), Duration::ZERO, &hidden()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn downloads_every_job() {
        let (base, hits) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let multibar = hidden();

        let jobs = resolve_jobs(&mirror, &[1, 2], dir.path(), Duration::ZERO, &multibar)
            .await
            .unwrap();
        let written = download_all(&mirror, &jobs, Duration::ZERO, &multibar, |_| Ok(true))
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        for job in &jobs {
            assert_eq!(fs::read(&job.path).unwrap(), fake::archive(job.id));
        }
    }

    #[tokio::test]
    async fn declined_confirmation_downloads_nothing() {
        let (base, hits) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let multibar = hidden();

        let jobs = resolve_jobs(&mirror, &[1, 2], dir.path(), Duration::ZERO, &multibar)
            .await
            .unwrap();
        let written = download_all(&mirror, &jobs, Duration::ZERO, &multibar, |shown| {
            assert_eq!(shown.len(), 2);
            Ok(false)
        })
        .await
        .unwrap();

        assert_eq!(written, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_confirmation_prompt_downloads_nothing() {
        let (base, hits) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let multibar = hidden();

        let jobs = resolve_jobs(&mirror, &[1], dir.path(), Duration::ZERO, &multibar)
            .await
            .unwrap();
        let result = download_all(&mirror, &jobs, Duration::ZERO, &multibar, |_| {
            Err(eyre!("not a terminal"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_content_length_fails_without_a_file() {
        let (base, _) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let multibar = hidden();

        let jobs = resolve_jobs(&mirror, &[fake::UNSIZED, 1], dir.path(), Duration::ZERO, &multibar)
            .await
            .unwrap();
        let result = download_all(&mirror, &jobs, Duration::ZERO, &multibar, |_| Ok(true)).await;

        assert!(result.is_err());
        assert!(!jobs[0].path.exists());
        assert!(!jobs[1].path.exists());
    }

    #[tokio::test]
    async fn mirror_error_aborts_remaining_downloads() {
        let (base, hits) = fake::serve().await;
        let mirror = MirrorClient::new(Client::new(), &base);
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            DownloadJob::new(fake::MISSING, &info("gone", "gone"), dir.path()),
            DownloadJob::new(5, &info("kept", "kept"), dir.path()),
        ];

        let result = download_all(&mirror, &jobs, Duration::ZERO, &hidden(), |_| Ok(true)).await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!jobs[1].path.exists());
    }
}
