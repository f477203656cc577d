use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use art_registry::auth::{self, Session};
use art_registry::database::Database;
use art_registry::ingest::{ImageFile, MAX_READ_BYTES};
use art_registry::models::{
    ArtworkPatch, ArtworkStatus, DimensionUnit, Dimensions, ProfilePatch, UserType,
    VerificationTier,
};
use art_registry::services::artworks::resolve_artist;
use art_registry::services::outreach::{self, SurveySubmission, WaitlistEntry};
use art_registry::services::{collections, register_artwork, ArtworkService, ProfileService};
use art_registry::simulate::certificate::GENERATION_STEPS;
use art_registry::simulate::{
    CertificateIssuer, CertificateRequest, SimulatedCertificateIssuer, SimulatedTagReader,
    TagReader, TaskStatus,
};
use art_registry::storage::{LocalObjectStorage, AVATAR_FIELD, PRIMARY_IMAGE_FIELD};
use art_registry::utils::config::{self, AppConfig};
use art_registry::views;
use art_registry::wizard::{EditionType, RegistrationWizard};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SCAN_STEPS: &[&str] = &["Hold the tag near the reader"];

#[derive(Parser, Debug)]
#[command(name = "art-registry", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file with ART_* settings
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and store the session
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Signout,
    /// Show the signed-in user's dashboard
    Whoami,
    /// Register an artwork, optionally with a certificate and an NFC tag
    Register(RegisterArgs),
    /// List your artworks, newest first
    List,
    Show {
        id: String,
    },
    Update(UpdateArgs),
    Delete {
        id: String,
    },
    /// Generate a certificate of authenticity for an existing artwork
    Certify {
        id: String,
        /// Artist name printed on the certificate
        #[arg(long)]
        artist: Option<String>,
    },
    /// Scan and bind an NFC tag to an existing artwork
    BindTag {
        id: String,
    },
    /// Record a verification level
    Verify {
        id: String,
        #[arg(long)]
        level: VerificationTier,
        #[arg(long)]
        by: Option<String>,
    },
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Render a public profile by id or handle
    Public {
        param: String,
    },
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Join the waitlist
    Waitlist {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: String,
    },
    /// Submit survey answers as a JSON object
    Survey {
        #[arg(long)]
        email: String,
        #[arg(long)]
        responses: String,
    },
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    title: String,
    /// Defaults to your profile name
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    year: String,
    #[arg(long)]
    medium: String,
    #[arg(long)]
    height: String,
    #[arg(long)]
    width: String,
    #[arg(long)]
    depth: Option<String>,
    #[arg(long, default_value = "in")]
    unit: DimensionUnit,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, requires = "edition_size")]
    edition_number: Option<String>,
    #[arg(long, requires = "edition_number")]
    edition_size: Option<String>,
    /// Hide the artwork from your public profile
    #[arg(long)]
    private: bool,
    /// Primary image (JPEG, PNG or WebP)
    #[arg(long)]
    image: PathBuf,
    /// Generate a certificate of authenticity
    #[arg(long)]
    certificate: bool,
    /// Scan and bind an NFC tag
    #[arg(long)]
    nfc: bool,
}

#[derive(clap::Args, Debug)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    medium: Option<String>,
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    depth: Option<f64>,
    #[arg(long)]
    unit: Option<DimensionUnit>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<ArtworkStatus>,
    #[arg(long)]
    public: Option<bool>,
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        user_type: Option<UserType>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        handle: Option<String>,
        #[arg(long)]
        public: Option<bool>,
    },
    /// Upload a new avatar image
    Avatar {
        image: PathBuf,
    },
    Stats,
    Delete,
}

#[derive(Subcommand, Debug)]
enum CollectionCommand {
    Create { name: String },
    List,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// Write the current settings to the env file
    Init {
        #[arg(long)]
        force: bool,
    },
}

struct App {
    config: AppConfig,
    db: Database,
    storage: LocalObjectStorage,
}

impl App {
    fn open(config: AppConfig) -> Result<Self> {
        let db = Database::open(&config.db_path).context("Failed to open registry database")?;
        let storage = LocalObjectStorage::new(config.storage_root.clone(), &config.public_base_url)
            .context("Failed to open object storage")?;
        Ok(Self { config, db, storage })
    }

    fn session(&self) -> Result<Session> {
        Ok(auth::current_user(&self.db, &self.config.session_path())?)
    }

    fn artworks(&self) -> ArtworkService<'_> {
        ArtworkService::new(&self.db, &self.storage)
    }

    fn profiles(&self) -> ProfileService<'_> {
        ProfileService::new(&self.db, &self.storage)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.env_file)?;

    if let Commands::Config(command) = &cli.command {
        return run_config(command, &cli.env_file, &config);
    }

    let app = App::open(config)?;
    run(&app, cli.command)
}

fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { email, password } => {
            let user = auth::sign_up(&app.db, &email, &password)?;
            app.profiles().get_or_create_profile(&user.id, &user.email)?;
            print_json(&user)
        }
        Commands::Signin { email, password } => {
            let session =
                auth::sign_in_with_password(&app.db, &app.config.session_path(), &email, &password)?;
            print_json(&session)
        }
        Commands::Signout => Ok(auth::sign_out(&app.config.session_path())?),
        Commands::Whoami => {
            let session = app.session()?;
            print_json(&views::dashboard(&app.db, &app.storage, &session.user_id, &session.email)?)
        }
        Commands::Register(args) => cmd_register(app, args),
        Commands::List => {
            let session = app.session()?;
            print_json(&app.artworks().list_artworks(&session.user_id)?)
        }
        Commands::Show { id } => {
            let session = app.session()?;
            match app.artworks().get_artwork(&id, &session.user_id)? {
                Some(artwork) => print_json(&artwork),
                None => bail!("Artwork {id} not found"),
            }
        }
        Commands::Update(args) => cmd_update(app, args),
        Commands::Delete { id } => {
            let session = app.session()?;
            app.artworks().delete_artwork(&id, &session.user_id)?;
            info!("Deleted artwork {}", id);
            Ok(())
        }
        Commands::Certify { id, artist } => cmd_certify(app, &id, artist),
        Commands::BindTag { id } => {
            let session = app.session()?;
            // Checked before scanning so a foreign id fails fast.
            if app.artworks().get_artwork(&id, &session.user_id)?.is_none() {
                bail!("Artwork {id} not found");
            }
            let reader = SimulatedTagReader::new(app.config.nfc_scan_delay);
            let mut task = reader.scan();
            let binding = match wait_with_progress(SCAN_STEPS, || task.poll().clone()) {
                Ok(binding) => binding,
                Err(message) => bail!("NFC scan failed: {message}"),
            };
            print_json(&app.artworks().create_nfc_tag(&id, &session.user_id, binding)?)
        }
        Commands::Verify { id, level, by } => {
            let session = app.session()?;
            let row = app
                .artworks()
                .update_verification_level(&id, &session.user_id, level, by.as_deref())?;
            print_json(&row)
        }
        Commands::Profile(command) => cmd_profile(app, command),
        Commands::Public { param } => {
            print_json(&views::resolve_profile_route(&app.db, &app.storage, &param)?)
        }
        Commands::Collection(command) => {
            let session = app.session()?;
            match command {
                CollectionCommand::Create { name } => {
                    print_json(&collections::create_collection(&app.db, &session.user_id, &name)?)
                }
                CollectionCommand::List => {
                    print_json(&collections::list_collections(&app.db, &session.user_id)?)
                }
            }
        }
        Commands::Waitlist { email, name, role } => {
            let entry = WaitlistEntry { email, name, role };
            print_json(&outreach::receipt(outreach::submit_waitlist(&app.db, &entry))?)
        }
        Commands::Survey { email, responses } => {
            let responses = serde_json::from_str(&responses).context("--responses must be JSON")?;
            let submission = SurveySubmission { email, responses };
            print_json(&outreach::receipt(outreach::submit_survey(&app.db, &submission))?)
        }
        Commands::Config(_) => Ok(()),
    }
}

fn run_config(command: &ConfigCommand, env_file: &Path, config: &AppConfig) -> Result<()> {
    match command {
        ConfigCommand::Show => print_json(config),
        ConfigCommand::Init { force } => {
            if env_file.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", env_file.display());
            }
            config::save_to_env(env_file, config)?;
            info!("Wrote configuration to {}", env_file.display());
            Ok(())
        }
    }
}

fn cmd_register(app: &App, args: RegisterArgs) -> Result<()> {
    let session = app.session()?;
    let image = ImageFile::read(&args.image, PRIMARY_IMAGE_FIELD, app.config.max_image_bytes)
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;

    let mut wizard = RegistrationWizard::new(
        Utc::now().year(),
        app.config.max_image_bytes,
        app.config.autosave_delay,
    );
    let edition_type = if args.edition_number.is_some() {
        EditionType::Editioned
    } else {
        EditionType::Unique
    };
    wizard.edit_form(Instant::now(), |form| {
        form.title = args.title.clone();
        form.artist = args.artist.clone().unwrap_or_default();
        form.year = args.year.clone();
        form.medium = args.medium.clone();
        form.height = args.height.clone();
        form.width = args.width.clone();
        form.depth = args.depth.clone().unwrap_or_default();
        form.unit = args.unit;
        form.description = args.description.clone().unwrap_or_default();
        form.edition_type = edition_type;
        form.edition_number = args.edition_number.clone().unwrap_or_default();
        form.edition_size = args.edition_size.clone().unwrap_or_default();
        form.is_public = !args.private;
        form.primary_image = Some(image);
    })?;
    wizard.submit()?;

    if args.certificate {
        wizard.choose_certificate()?;
        let artist = resolve_artist(&app.db, &session.user_id, args.artist.as_deref())?;
        wizard.set_artist_name(&artist)?;
        let issuer = SimulatedCertificateIssuer::new(
            &app.config.verify_base_url,
            app.config.certificate_delay,
        );
        wizard.start_certificate(&issuer)?;
        match wait_with_progress(GENERATION_STEPS, || wizard.poll_certificate()) {
            Ok(certificate) => {
                info!("Certificate {} generated", certificate.certificate_id);
                wizard.continue_to_nfc()?;
            }
            Err(message) => {
                warn!("Certificate generation failed, continuing without one: {}", message);
                wizard.skip_certificate()?;
            }
        }
    } else {
        wizard.skip_certificate()?;
    }

    if args.nfc {
        wizard.set_bind_nfc(true)?;
        let reader = SimulatedTagReader::new(app.config.nfc_scan_delay);
        wizard.start_scan(&reader)?;
        match wait_with_progress(SCAN_STEPS, || wizard.poll_scan()) {
            Ok(binding) => {
                info!("Tag {} scanned", binding.nfc_uid);
                wizard.complete()?;
            }
            Err(message) => {
                warn!("NFC scan failed, continuing without a tag: {}", message);
                wizard.skip_nfc()?;
            }
        }
    } else {
        wizard.skip_nfc()?;
    }

    let request = wizard.registration_request()?;
    let outcome = register_artwork(
        &app.db,
        &app.storage,
        &session.user_id,
        request,
        app.config.max_image_bytes,
    )?;
    if let Some(warning) = &outcome.image_warning {
        warn!("{}", warning);
    }
    print_json(&outcome)
}

fn cmd_update(app: &App, args: UpdateArgs) -> Result<()> {
    let session = app.session()?;
    let resizing =
        args.height.is_some() || args.width.is_some() || args.depth.is_some() || args.unit.is_some();
    let dimensions = if resizing {
        let Some(current) = app.artworks().get_artwork(&args.id, &session.user_id)? else {
            bail!("Artwork {} not found", args.id);
        };
        let current = current.artwork.dimensions;
        Some(Dimensions {
            height: args.height.unwrap_or(current.height),
            width: args.width.unwrap_or(current.width),
            depth: args.depth.or(current.depth),
            unit: args.unit.unwrap_or(current.unit),
        })
    } else {
        None
    };

    let patch = ArtworkPatch {
        title: args.title,
        artist: args.artist,
        year: args.year,
        medium: args.medium,
        dimensions,
        description: args.description,
        status: args.status,
        is_public: args.public,
        ..ArtworkPatch::default()
    };
    if patch.is_empty() {
        bail!("Nothing to update");
    }
    print_json(&app.artworks().update_artwork(&args.id, &session.user_id, patch)?)
}

fn cmd_certify(app: &App, id: &str, artist: Option<String>) -> Result<()> {
    let session = app.session()?;
    let Some(record) = app.artworks().get_artwork(id, &session.user_id)? else {
        bail!("Artwork {id} not found");
    };
    let artist_name = match artist {
        Some(name) => resolve_artist(&app.db, &session.user_id, Some(&name))?,
        None => record.artwork.artist.clone(),
    };
    let request = CertificateRequest {
        artwork_title: record.artwork.title.clone(),
        artist_name,
    };
    let issuer =
        SimulatedCertificateIssuer::new(&app.config.verify_base_url, app.config.certificate_delay);
    let mut task = issuer.issue(&request);
    let data = match wait_with_progress(GENERATION_STEPS, || task.poll().clone()) {
        Ok(data) => data,
        Err(message) => bail!("Certificate generation failed: {message}"),
    };
    print_json(&app.artworks().create_certificate(id, &session.user_id, data)?)
}

fn cmd_profile(app: &App, command: ProfileCommand) -> Result<()> {
    let session = app.session()?;
    let profiles = app.profiles();
    profiles.get_or_create_profile(&session.user_id, &session.email)?;
    match command {
        ProfileCommand::Show => print_json(&profiles.get_user_profile(&session.user_id)?),
        ProfileCommand::Update {
            full_name,
            user_type,
            bio,
            website,
            location,
            phone,
            handle,
            public,
        } => {
            let patch = ProfilePatch {
                full_name,
                user_type,
                bio,
                website,
                location,
                phone,
                handle,
                is_public: public,
                ..ProfilePatch::default()
            };
            print_json(&profiles.update_user_profile(&session.user_id, patch)?)
        }
        ProfileCommand::Avatar { image } => {
            let image = ImageFile::read(&image, AVATAR_FIELD, MAX_READ_BYTES)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            print_json(&profiles.upload_avatar(&session.user_id, &image)?)
        }
        ProfileCommand::Stats => print_json(&profiles.get_user_stats(&session.user_id)?),
        ProfileCommand::Delete => {
            profiles.delete_user_profile(&session.user_id)?;
            Ok(())
        }
    }
}

/// Polls until the task settles, cycling `steps` on a spinner meanwhile.
fn wait_with_progress<T, F>(steps: &[&str], mut poll: F) -> std::result::Result<T, String>
where
    F: FnMut() -> TaskStatus<T>,
{
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(POLL_INTERVAL);

    let started = Instant::now();
    loop {
        match poll() {
            TaskStatus::Pending => {}
            TaskStatus::Succeeded(value) => {
                spinner.finish_and_clear();
                return Ok(value);
            }
            TaskStatus::Failed(message) => {
                spinner.finish_and_clear();
                return Err(message);
            }
        }
        if !steps.is_empty() {
            let step = (started.elapsed().as_millis() / 750) as usize % steps.len();
            spinner.set_message(steps[step].to_string());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
