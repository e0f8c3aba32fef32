use crate::download::DownloadJob;
use dialoguer::{Confirm, Input};
use eyre::{bail, eyre, Context, Result};
use std::{
    env,
    fs::{create_dir_all, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const CLIENT_ID: &str = "CLIENT_ID";
const CLIENT_SECRET: &str = "CLIENT_SECRET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Credential values as found in one source, either of which may be missing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PartialCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl PartialCredentials {
    fn from_env() -> PartialCredentials {
        PartialCredentials {
            client_id: env::var(CLIENT_ID).ok(),
            client_secret: env::var(CLIENT_SECRET).ok(),
        }
    }

    /// Values in `self` win over `fallback`.
    fn or(self, fallback: PartialCredentials) -> PartialCredentials {
        PartialCredentials {
            client_id: self.client_id.or(fallback.client_id),
            client_secret: self.client_secret.or(fallback.client_secret),
        }
    }

    fn complete(self) -> Result<Credentials, &'static str> {
        match (self.client_id, self.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Credentials {
                client_id,
                client_secret,
            }),
            (None, _) => Err(CLIENT_ID),
            (_, None) => Err(CLIENT_SECRET),
        }
    }
}

/// Reads the env file without touching the process environment.
/// Returns `None` when the file does not exist.
pub fn read_env_file(path: &Path) -> Result<Option<PartialCredentials>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(None),
        Err(err) => {
            return Err(err).wrap_err_with(|| format!("Failed to open {}.", path.display()))
        }
    };

    let mut found = PartialCredentials::default();
    for entry in entries {
        let (key, value) =
            entry.wrap_err_with(|| format!("Failed to parse {}.", path.display()))?;
        match key.as_str() {
            CLIENT_ID => found.client_id = Some(value),
            CLIENT_SECRET => found.client_secret = Some(value),
            _ => {}
        }
    }

    Ok(Some(found))
}

pub fn write_env_file(path: &Path, credentials: &Credentials) -> Result<()> {
    write(
        path,
        format!(
            "{CLIENT_ID}={}\n{CLIENT_SECRET}={}\n",
            credentials.client_id, credentials.client_secret
        ),
    )
    .wrap_err_with(|| format!("Failed to write {}.", path.display()))
}

fn prompt_credentials() -> Result<Credentials> {
    #[allow(clippy::ptr_arg)]
    fn validator(value: &String) -> Result<(), &'static str> {
        if value.trim().is_empty() {
            Err("Value must not be empty.")
        } else {
            Ok(())
        }
    }

    Ok(Credentials {
        client_id: Input::new()
            .with_prompt("Enter your Client ID")
            .validate_with(validator)
            .interact_text()
            .wrap_err("prompt_client_id error")?,
        client_secret: Input::new()
            .with_prompt("Enter your Client Secret")
            .validate_with(validator)
            .interact_text()
            .wrap_err("prompt_client_secret error")?,
    })
}

/// Environment variables override the env file. On first run, when neither has the
/// credentials and the file is absent, they are asked for and saved to the file.
pub fn resolve_credentials(env_file: &Path) -> Result<Credentials> {
    let from_file = read_env_file(env_file)?;
    let file_exists = from_file.is_some();

    match PartialCredentials::from_env()
        .or(from_file.unwrap_or_default())
        .complete()
    {
        Ok(credentials) => {
            debug!("Loaded credentials");
            Ok(credentials)
        }
        Err(missing) if file_exists => Err(eyre!(
            "{} is missing from {} and the environment.",
            missing,
            env_file.display()
        )),
        Err(_) => {
            println!("Welcome to osu!");
            println!("Create an OAuth application at https://osu.ppy.sh/home/account/edit to get these.");
            let credentials = prompt_credentials()?;
            write_env_file(env_file, &credentials)?;
            info!("Saved credentials to {}", env_file.display());
            Ok(credentials)
        }
    }
}

/// Checks the output directory, creating it once the user agrees to.
pub fn ensure_output_dir(path: &Path, assume_yes: bool) -> Result<PathBuf> {
    if path.is_file() {
        bail!("{} is a file, it should be a directory.", path.display());
    }

    let exists = path
        .try_exists()
        .wrap_err("Failed to check if folder already exists.")?;

    if !exists {
        let confirmed = assume_yes
            || Confirm::new()
                .with_prompt(format!(
                    "{} does not exist, create it now?",
                    path.display()
                ))
                .default(true)
                .interact()
                .wrap_err("prompt_create_dir error")?;

        if !confirmed {
            bail!("User canceled operation.");
        }

        create_dir_all(path).wrap_err("Failed to create directory!")?;
        info!("Created {}", path.display());
    }

    Ok(path.to_path_buf())
}

/// Lists the jobs and asks before anything is downloaded. Only an explicit yes proceeds.
pub fn confirm_download(jobs: &[DownloadJob], folder: &Path, assume_yes: bool) -> Result<bool> {
    for job in jobs {
        println!("  {:>8}  {}", job.id, job.filename);
    }

    if assume_yes {
        return Ok(true);
    }

    Confirm::new()
        .with_prompt(format!(
            "Download {} beatmap sets to {}?",
            jobs.len(),
            folder.display()
        ))
        .default(false)
        .interact()
        .wrap_err("prompt_confirm_download error")
}
