use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use keystrata::error::Result;
use keystrata::keyset::filesystem::{FileSystemKeySet, FileSystemKeySetWriter};
use keystrata::keyset::metadata::{DigestAlg, KeyKind, KeyMetadata, KeyPurpose, KeyStatus};
use keystrata::keyset::mutable::MutableKeySet;
use keystrata::keyset::KeySet;

#[derive(Parser)]
#[command(name = "keystrata")]
#[command(about = "Manage layered key sets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new key set directory with empty metadata
    Create {
        path: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value = "crypt")]
        purpose: PurposeArg,
        #[arg(long, value_enum, default_value = "symmetric")]
        kind: KindArg,
        #[arg(long, value_enum, default_value = "sha256")]
        digest: DigestArg,
    },
    /// Generate a new key version
    AddKey {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "primary")]
        status: StatusArg,
    },
    /// Raise a version one status step
    Promote { path: PathBuf, version: u32 },
    /// Lower a version one status step
    Demote { path: PathBuf, version: u32 },
    /// Remove an inactive version
    Revoke { path: PathBuf, version: u32 },
    /// Show key set metadata
    Status { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum PurposeArg {
    Crypt,
    Sign,
    Verify,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Symmetric,
    Private,
    Public,
}

#[derive(Clone, Copy, ValueEnum)]
enum DigestArg {
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Primary,
    Active,
    Inactive,
}

impl From<PurposeArg> for KeyPurpose {
    fn from(arg: PurposeArg) -> Self {
        match arg {
            PurposeArg::Crypt => KeyPurpose::EncryptDecrypt,
            PurposeArg::Sign => KeyPurpose::SignVerify,
            PurposeArg::Verify => KeyPurpose::VerifyOnly,
        }
    }
}

impl From<KindArg> for KeyKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Symmetric => KeyKind::Symmetric,
            KindArg::Private => KeyKind::Private,
            KindArg::Public => KeyKind::Public,
        }
    }
}

impl From<DigestArg> for DigestAlg {
    fn from(arg: DigestArg) -> Self {
        match arg {
            DigestArg::Sha256 => DigestAlg::Sha256,
            DigestArg::Sha384 => DigestAlg::Sha384,
            DigestArg::Sha512 => DigestAlg::Sha512,
        }
    }
}

impl From<StatusArg> for KeyStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Primary => KeyStatus::Primary,
            StatusArg::Active => KeyStatus::Active,
            StatusArg::Inactive => KeyStatus::Inactive,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create {
            path,
            name,
            purpose,
            kind,
            digest,
        } => {
            let metadata = KeyMetadata::new(name, purpose.into(), kind.into())
                .with_digest(digest.into());
            let set = MutableKeySet::new(metadata);
            let mut writer = FileSystemKeySetWriter::create(&path).await?;
            set.save(&mut writer).await?;
            println!("Created key set at {}", path.display());
        }
        Commands::AddKey { path, status } => {
            let mut set = load(&path).await?;
            let version = set.add_key(status.into())?;
            save(&set, &path).await?;
            println!("Added version {version}");
        }
        Commands::Promote { path, version } => {
            let mut set = load(&path).await?;
            let status = set.promote(version)?;
            save(&set, &path).await?;
            println!("Version {version} is now {status:?}");
        }
        Commands::Demote { path, version } => {
            let mut set = load(&path).await?;
            let status = set.demote(version)?;
            save(&set, &path).await?;
            println!("Version {version} is now {status:?}");
        }
        Commands::Revoke { path, version } => {
            let mut set = load(&path).await?;
            set.revoke(version)?;
            save(&set, &path).await?;
            // The version file stays behind; the metadata no longer points
            // at it
            println!("Revoked version {version}");
        }
        Commands::Status { path } => {
            let metadata = FileSystemKeySet::new(&path).metadata().await?;
            println!("name:      {}", metadata.name);
            println!("purpose:   {:?}", metadata.purpose);
            println!("kind:      {:?}", metadata.kind);
            println!("digest:    {:?}", metadata.digest);
            println!("encrypted: {}", metadata.encrypted);
            for version in &metadata.versions {
                println!(
                    "version {:>3}  {:?}",
                    version.version_number, version.status
                );
            }
        }
    }
    Ok(())
}

async fn load(path: &PathBuf) -> Result<MutableKeySet> {
    MutableKeySet::from_key_set(&FileSystemKeySet::new(path)).await
}

async fn save(set: &MutableKeySet, path: &PathBuf) -> Result<()> {
    let mut writer = FileSystemKeySetWriter::create(path).await?;
    set.save(&mut writer).await?;
    Ok(())
}
