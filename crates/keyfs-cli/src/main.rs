//! keyfsctl: key management for keyfs-encrypted filesystems.
//!
//! Single-key commands (addkey/delkey/setkey/getkey/flushkeys/showkeys)
//! derive a key from a passphrase or keyfile and drive the engine's key
//! tables; chain commands (addchain/delchain/showchains/randomchain) edit the
//! per-filesystem chain store that lets one key unwrap the next.

mod fsroot;
mod prompt;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use keyfs_chain::{ChainLookup, ChainStore, RandomChainPolicy};
use keyfs_core::config::KeyfsConfig;
use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use keyfs_crypto::{derive, KeyParam, XKey};
use keyfs_engine::{KeyTable, Scope, UdsKeyTable};
use secrecy::SecretString;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyfsctl",
    version,
    about = "keyfs key and key-chain management",
    long_about = "keyfsctl: install, inspect, and remove the keys protecting a \
                  keyfs filesystem, and manage its key wrapping chains"
)]
struct Cli {
    /// Path to keyfs.toml configuration file
    #[arg(long, env = "KEYFS_CONFIG", default_value = "/etc/keyfs/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive a key and install it (and its chain) into a filesystem
    Addkey {
        #[command(flatten)]
        key: KeyFlags,
        #[command(flatten)]
        chain: ChainFlags,
        /// Print each installed key
        #[arg(short, long)]
        verbose: bool,
        /// Any path inside the mounted filesystem
        filesystem: PathBuf,
    },

    /// Remove a key (and its chain) from a filesystem
    Delkey {
        #[command(flatten)]
        key: KeyFlags,
        #[command(flatten)]
        chain: ChainFlags,
        /// Print each removed key
        #[arg(short, long)]
        verbose: bool,
        filesystem: PathBuf,
    },

    /// Assign the key that encrypts a directory going forward
    Setkey {
        #[command(flatten)]
        key: KeyFlags,
        #[command(flatten)]
        chain: ChainFlags,
        /// Install the key as well
        #[arg(short = 'x', long)]
        install: bool,
        #[arg(short, long)]
        verbose: bool,
        directory: PathBuf,
    },

    /// Show the key protecting a single file or directory
    Getkey {
        /// Report via exit status only
        #[arg(short = 't', long)]
        test_only: bool,
        file: PathBuf,
    },

    /// Remove every key installed for a filesystem
    Flushkeys { filesystem: PathBuf },

    /// List the keys installed for a filesystem
    Showkeys {
        /// Report via exit status only
        #[arg(short = 't', long)]
        test_only: bool,
        filesystem: PathBuf,
    },

    /// Wrap one key under another in the filesystem's chain store
    Addchain {
        #[command(flatten)]
        key: KeyFlags,
        #[command(flatten)]
        child: ChildKeyFlags,
        /// End the chain with a sentinel instead of a chained key
        #[arg(short = 'Z', long)]
        terminator: bool,
        /// Skip the filesystem type check
        #[arg(short = 'f', long)]
        ignore_type: bool,
        #[arg(short, long)]
        verbose: bool,
        filesystem: PathBuf,
    },

    /// Delete a key chain from the store
    Delchain {
        #[command(flatten)]
        key: KeyFlags,
        /// Delete every entry of the chain, not just the deepest
        #[arg(short = 'F', long)]
        all: bool,
        /// Skip the filesystem type check
        #[arg(short = 'f', long)]
        ignore_type: bool,
        #[arg(short, long)]
        verbose: bool,
        filesystem: PathBuf,
    },

    /// Pad the chain store with random filler entries
    Randomchain {
        /// Lower bound for filler entries (inclusive)
        #[arg(short = 'n', long)]
        min: Option<u32>,
        /// Upper bound for filler entries (exclusive)
        #[arg(short = 'N', long)]
        max: Option<u32>,
        /// Skip the filesystem type check
        #[arg(short = 'f', long)]
        ignore_type: bool,
        #[arg(short, long)]
        verbose: bool,
        filesystem: PathBuf,
    },

    /// Resolve and print the chain rooted at a key
    Showchains {
        #[command(flatten)]
        key: KeyFlags,
        /// Skip the filesystem type check
        #[arg(short = 'f', long)]
        ignore_type: bool,
        filesystem: PathBuf,
    },

    /// List supported algorithms
    Showalgs,
}

/// Key derivation flags shared by key-consuming commands.
#[derive(Args, Debug)]
struct KeyFlags {
    /// Cipher algorithm for the derived key
    #[arg(short = 'a', long)]
    alg: Option<String>,

    /// PBKDF2 iteration count
    #[arg(short = 'i', long)]
    iterations: Option<u32>,

    /// Keyfile mixed into the derivation
    #[arg(short = 'k', long)]
    keyfile: Option<PathBuf>,

    /// Derive from the keyfile alone, without a passphrase
    #[arg(short = 'p', long)]
    no_passphrase: bool,
}

impl KeyFlags {
    fn to_params(&self, config: &KeyfsConfig) -> KeyfsResult<KeyParam> {
        build_params(
            self.alg.as_deref(),
            self.iterations,
            self.keyfile.clone(),
            self.no_passphrase,
            config,
        )
    }
}

/// Derivation flags for the chained (wrapped) key of `addchain`.
#[derive(Args, Debug)]
struct ChildKeyFlags {
    /// Cipher algorithm for the chained key
    #[arg(short = 'A', long)]
    child_alg: Option<String>,

    /// PBKDF2 iteration count for the chained key
    #[arg(short = 'I', long)]
    child_iterations: Option<u32>,

    /// Keyfile for the chained key
    #[arg(short = 'K', long)]
    child_keyfile: Option<PathBuf>,

    /// Derive the chained key from its keyfile alone
    #[arg(short = 'P', long)]
    child_no_passphrase: bool,
}

impl ChildKeyFlags {
    fn any_set(&self) -> bool {
        self.child_alg.is_some()
            || self.child_iterations.is_some()
            || self.child_keyfile.is_some()
            || self.child_no_passphrase
    }

    fn to_params(&self, config: &KeyfsConfig) -> KeyfsResult<KeyParam> {
        build_params(
            self.child_alg.as_deref(),
            self.child_iterations,
            self.child_keyfile.clone(),
            self.child_no_passphrase,
            config,
        )
    }
}

fn build_params(
    alg: Option<&str>,
    iterations: Option<u32>,
    keyfile: Option<PathBuf>,
    no_passphrase: bool,
    config: &KeyfsConfig,
) -> KeyfsResult<KeyParam> {
    let alg = match alg {
        Some(name) => KeyAlg::parse(name)?,
        None => KeyAlg::parse(&config.kdf.algorithm)?,
    };
    Ok(KeyParam {
        alg: Some(alg),
        iterations: iterations.unwrap_or(config.kdf.iterations),
        keyfile,
        no_passphrase,
    })
}

/// Chain lookup mode flags shared by key-consuming commands.
#[derive(Args, Debug)]
struct ChainFlags {
    /// The key must root a persisted chain
    #[arg(short = 'c', long)]
    chain: bool,

    /// Use the key directly, skipping chain lookup
    #[arg(short = 'C', long, conflicts_with = "chain")]
    no_chain: bool,
}

impl ChainFlags {
    /// `None` means no store lookup at all.
    fn mode(&self) -> Option<ChainLookup> {
        if self.no_chain {
            None
        } else if self.chain {
            Some(ChainLookup::Use)
        } else {
            Some(ChainLookup::IgnoreMissing)
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, KeyfsError::InvalidAlgorithm(_)) {
                show_algs_to_stderr();
            }
            eprintln!("keyfsctl: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> KeyfsResult<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Addkey {
            key,
            chain,
            verbose,
            filesystem,
        } => cmd_addkey(&config, &key, &chain, verbose, &filesystem),
        Commands::Delkey {
            key,
            chain,
            verbose,
            filesystem,
        } => cmd_delkey(&config, &key, &chain, verbose, &filesystem),
        Commands::Setkey {
            key,
            chain,
            install,
            verbose,
            directory,
        } => cmd_setkey(&config, &key, &chain, install, verbose, &directory),
        Commands::Getkey { test_only, file } => cmd_getkey(&config, test_only, &file),
        Commands::Flushkeys { filesystem } => cmd_flushkeys(&config, &filesystem),
        Commands::Showkeys {
            test_only,
            filesystem,
        } => cmd_showkeys(&config, test_only, &filesystem),
        Commands::Addchain {
            key,
            child,
            terminator,
            ignore_type,
            verbose,
            filesystem,
        } => cmd_addchain(&config, &key, &child, terminator, ignore_type, verbose, &filesystem),
        Commands::Delchain {
            key,
            all,
            ignore_type,
            verbose,
            filesystem,
        } => cmd_delchain(&config, &key, all, ignore_type, verbose, &filesystem),
        Commands::Randomchain {
            min,
            max,
            ignore_type,
            verbose,
            filesystem,
        } => cmd_randomchain(&config, min, max, ignore_type, verbose, &filesystem),
        Commands::Showchains {
            key,
            ignore_type,
            filesystem,
        } => cmd_showchains(&config, &key, ignore_type, &filesystem),
        Commands::Showalgs => {
            cmd_showalgs();
            Ok(())
        }
    }
}

fn exit_code(err: &KeyfsError) -> u8 {
    match err {
        KeyfsError::Usage(_) => 2,
        KeyfsError::InvalidAlgorithm(_)
        | KeyfsError::InvalidChain(_)
        | KeyfsError::ChainAlreadySet(..)
        | KeyfsError::CorruptEntry(_)
        | KeyfsError::CorruptChain(_)
        | KeyfsError::WrongType(_) => 3,
        KeyfsError::Io(_) => 4,
        KeyfsError::Engine(_) => 5,
        KeyfsError::Other(_) => 1,
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> KeyfsResult<KeyfsConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KeyfsError::Io(std::io::Error::new(
                e.kind(),
                format!("config {}: {e}", path.display()),
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| KeyfsError::Other(anyhow::anyhow!("parsing {}: {e}", path.display())))
    } else {
        Ok(KeyfsConfig::default())
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Prompt (unless disabled) and derive the key for `params`.
fn obtain_key(label: &str, confirm: bool, params: &KeyParam) -> KeyfsResult<XKey> {
    params.validate()?;
    let passphrase = if params.no_passphrase {
        SecretString::from(String::new())
    } else {
        prompt::read_secret(label, confirm)?
    };
    derive(&passphrase, params)
}

/// Expand a derived key into the chain to operate on. `None` skips the store
/// entirely and uses the key as-is.
fn expand_chain(root: &Path, key: XKey, mode: Option<ChainLookup>) -> KeyfsResult<Vec<XKey>> {
    match mode {
        None => Ok(vec![key]),
        Some(mode) => {
            let store = ChainStore::open(root)?;
            keyfs_chain::resolve(&store, &key, mode)
        }
    }
}

fn connect_engine(config: &KeyfsConfig) -> KeyfsResult<UdsKeyTable> {
    UdsKeyTable::connect(&config.engine.socket)
}

fn show_node_key(path: &Path, key: Option<&XKey>) {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match key {
        Some(k) => println!("Key({base}): {} {}", k.id(), k.alg()),
        None => println!("Key({base}): <not specified>"),
    }
}

fn show_algs_to_stderr() {
    eprintln!("supported algorithms:");
    for alg in KeyAlg::ALL {
        eprintln!("\t{:<12} {:>3}-bit", alg.name(), alg.key_size() * 8);
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_addkey(
    config: &KeyfsConfig,
    key: &KeyFlags,
    chain: &ChainFlags,
    verbose: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, false)?;
    let params = key.to_params(config)?;
    let seed = obtain_key("passphrase", false, &params)?;
    let keys = expand_chain(&root, seed, chain.mode())?;

    let mut engine = connect_engine(config)?;
    let scope = Scope::Filesystem(root);
    for key in &keys {
        engine.install(&scope, key)?;
        if verbose {
            println!("Key added: {}", key.id());
        }
    }
    Ok(())
}

fn cmd_delkey(
    config: &KeyfsConfig,
    key: &KeyFlags,
    chain: &ChainFlags,
    verbose: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, false)?;
    let params = key.to_params(config)?;
    let seed = obtain_key("passphrase", false, &params)?;
    let keys = expand_chain(&root, seed, chain.mode())?;

    let mut engine = connect_engine(config)?;
    let scope = Scope::Filesystem(root);
    for key in &keys {
        if !engine.remove(&scope, key)? {
            tracing::warn!(key = %key.id(), "key was not installed");
        } else if verbose {
            println!("Key deleted: {}", key.id());
        }
    }
    Ok(())
}

fn cmd_setkey(
    config: &KeyfsConfig,
    key: &KeyFlags,
    chain: &ChainFlags,
    install: bool,
    verbose: bool,
    directory: &Path,
) -> KeyfsResult<()> {
    if chain.chain && install {
        return Err(KeyfsError::Usage(
            "invalid argument combination: --install with --chain".into(),
        ));
    }

    let root = fsroot::resolve_fs_root(directory, false)?;
    let params = key.to_params(config)?;
    let seed = obtain_key("passphrase", false, &params)?;

    // The node is protected by the deepest key of the chain; an unchained
    // key protects it directly.
    let keys = expand_chain(&root, seed, chain.mode())?;
    let Some(target) = keys.last() else {
        return Err(KeyfsError::InvalidChain("empty chain".into()));
    };

    let node = directory.canonicalize().map_err(|e| {
        KeyfsError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", directory.display()),
        ))
    })?;

    let mut engine = connect_engine(config)?;
    if install {
        engine.install(&Scope::Filesystem(root), target)?;
    }
    engine.bind(&Scope::Node(node), target)?;
    if verbose {
        show_node_key(directory, Some(target));
    }
    Ok(())
}

fn cmd_getkey(config: &KeyfsConfig, test_only: bool, file: &Path) -> KeyfsResult<()> {
    // Only the filesystem type is checked; the node keeps its own path.
    fsroot::resolve_fs_root(file, false)?;
    let node = file.canonicalize().map_err(|e| {
        KeyfsError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", file.display()),
        ))
    })?;

    let mut engine = connect_engine(config)?;
    match engine.query(&Scope::Node(node))? {
        Some(key) => {
            if !test_only {
                show_node_key(file, Some(&key));
            }
            Ok(())
        }
        None => {
            if test_only {
                Err(KeyfsError::Other(anyhow::anyhow!(
                    "no key set for {}",
                    file.display()
                )))
            } else {
                show_node_key(file, None);
                Ok(())
            }
        }
    }
}

fn cmd_flushkeys(config: &KeyfsConfig, filesystem: &Path) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, false)?;
    let mut engine = connect_engine(config)?;
    engine.remove_all(&Scope::Filesystem(root))
}

fn cmd_showkeys(config: &KeyfsConfig, test_only: bool, filesystem: &Path) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, false)?;
    let mut engine = connect_engine(config)?;
    let scope = Scope::Filesystem(root);

    match engine.enumerate(&scope, 0)? {
        None => {
            if test_only {
                return Err(KeyfsError::Other(anyhow::anyhow!("no keys installed")));
            }
            println!("No keys installed");
        }
        Some(first) => {
            if test_only {
                return Ok(());
            }
            println!("Keys:");
            let mut key = first;
            loop {
                println!("\t{:<4} {} {}", key.index(), key.id(), key.alg());
                let next_index = key.index() + 1;
                match engine.enumerate(&scope, next_index)? {
                    Some(next) => key = next,
                    None => break,
                }
            }
        }
    }
    Ok(())
}

fn cmd_addchain(
    config: &KeyfsConfig,
    key: &KeyFlags,
    child: &ChildKeyFlags,
    terminator: bool,
    ignore_type: bool,
    verbose: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    if terminator && child.any_set() {
        return Err(KeyfsError::Usage(
            "invalid argument combination: --terminator with chained key options".into(),
        ));
    }

    let root = fsroot::resolve_fs_root(filesystem, ignore_type)?;
    let parent_params = key.to_params(config)?;
    let parent = obtain_key("parent key passphrase", true, &parent_params)?;

    let mut store = ChainStore::open(&root)?;
    if terminator {
        keyfs_chain::add_chain_end(&mut store, &parent)?;
        if verbose {
            println!("Key chain set: {}", parent.id());
        }
        return Ok(());
    }

    let child_params = child.to_params(config)?;
    let chained = obtain_key("chained key passphrase", true, &child_params)?;
    keyfs_chain::add_chain(&mut store, &parent, &chained)?;
    if verbose {
        println!("Key chain set: {} -> {}", parent.id(), chained.id());
    }
    Ok(())
}

fn cmd_delchain(
    config: &KeyfsConfig,
    key: &KeyFlags,
    all: bool,
    ignore_type: bool,
    verbose: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, ignore_type)?;
    let params = key.to_params(config)?;
    let seed = obtain_key("passphrase", false, &params)?;

    let mut store = ChainStore::open(&root)?;
    let deleted = keyfs_chain::del_chain(&mut store, &seed, all)?;
    if verbose {
        for id in deleted {
            println!("Key chain deleted: {id}");
        }
    }
    Ok(())
}

fn cmd_randomchain(
    config: &KeyfsConfig,
    min: Option<u32>,
    max: Option<u32>,
    ignore_type: bool,
    verbose: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, ignore_type)?;
    let policy = RandomChainPolicy {
        min: min.unwrap_or(config.chain.random_min),
        max: max.unwrap_or(config.chain.random_max),
    };

    let mut store = ChainStore::open(&root)?;
    let pairs = keyfs_chain::random_chain(&mut store, &policy)?;
    if verbose {
        println!("Filler chain entries written: {pairs}");
    }
    Ok(())
}

fn cmd_showchains(
    config: &KeyfsConfig,
    key: &KeyFlags,
    ignore_type: bool,
    filesystem: &Path,
) -> KeyfsResult<()> {
    let root = fsroot::resolve_fs_root(filesystem, ignore_type)?;
    let params = key.to_params(config)?;
    let seed = obtain_key("passphrase", false, &params)?;

    let store = ChainStore::open(&root)?;
    let chain = keyfs_chain::resolve(&store, &seed, ChainLookup::Use)?;

    println!("Key chain:");
    for (i, key) in chain.iter().enumerate() {
        println!("\t{:<4} {} {}", i + 1, key.id(), key.alg());
    }
    Ok(())
}

fn cmd_showalgs() {
    for alg in KeyAlg::ALL {
        println!("{:<12} {:>3}-bit", alg.name(), alg.key_size() * 8);
    }
}
