//! rollout CLI - generate Nix deployment configs for containerized apps

mod form;
mod theme;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rollout_core::{
    commit_message, github_action, AppSpec, CommitOutcome, Generated, Registration, Rollout,
    RolloutConfig, SecretProvision, SecretSource, DEFAULT_BRANCH, DEFAULT_DEPLOY_REPO,
    DEFAULT_NETWORK,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use theme::Theme;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollout", version)]
#[command(about = "Generate Nix deployment configs for containerized apps behind Traefik")]
struct Cli {
    /// Directory holding ports.json and apps/ [default: $HOME/repos/rollouts/servers]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new nix config for an app
    Init(InitArgs),
    /// Print GitHub Actions workflow for container deployment
    GhAction {
        /// Branch to deploy from
        #[arg(long, default_value = DEFAULT_BRANCH)]
        branch: String,
        /// Repository receiving the deploy dispatch (owner/name)
        #[arg(long, default_value = DEFAULT_DEPLOY_REPO)]
        deploy_repo: String,
    },
    /// Commit and push changes to the rollouts repository
    Deploy {
        /// Commit message (repeat for multi-line messages)
        #[arg(short = 'm', long = "message")]
        messages: Vec<String>,
    },
    /// Show allocated host ports
    Ports,
}

#[derive(Args)]
struct InitArgs {
    /// Project name (e.g., kabilan108-com)
    #[arg(long)]
    name: Option<String>,
    /// Docker image url (e.g., ghcr.io/kabilan108/kabilan108.com:latest)
    #[arg(long)]
    image: Option<String>,
    /// Main domain (e.g., kabilan108.com)
    #[arg(long)]
    domain: Option<String>,
    /// Subdomain (leave blank for none)
    #[arg(long)]
    subdomain: Option<String>,
    /// Port the container exposes [default: 80]
    #[arg(long)]
    port: Option<u32>,
    /// Traefik docker network [default: web]
    #[arg(long)]
    network: Option<String>,
    /// Path to environment file, encrypted with agenix
    #[arg(long, conflicts_with = "edit")]
    env_file: Option<PathBuf>,
    /// Edit the environment file directly
    #[arg(long)]
    edit: bool,
    /// Add a mount (e.g., /host:/container[:ro|rw] or name:/container[:ro|rw])
    #[arg(long = "mount")]
    mounts: Vec<String>,
    /// Print the generated config but don't write anything
    #[arg(long)]
    dry_run: bool,
}

impl InitArgs {
    /// True when no app flag was given, so the form should ask instead.
    fn is_interactive(&self) -> bool {
        self.name.is_none()
            && self.image.is_none()
            && self.domain.is_none()
            && self.subdomain.is_none()
            && self.port.is_none()
            && self.network.is_none()
            && self.env_file.is_none()
            && !self.edit
            && self.mounts.is_empty()
    }

    fn into_spec(self) -> anyhow::Result<AppSpec> {
        let mut missing = Vec::new();
        let name = self.name.filter(|v| !v.is_empty());
        let image = self.image.filter(|v| !v.is_empty());
        let domain = self.domain.filter(|v| !v.is_empty());
        let port = self.port.unwrap_or(80);

        if name.is_none() {
            missing.push("--name");
        }
        if image.is_none() {
            missing.push("--image");
        }
        if domain.is_none() {
            missing.push("--domain");
        }
        let container_port = u16::try_from(port).ok().filter(|p| *p > 0);
        if container_port.is_none() {
            missing.push("--port (1-65535)");
        }

        let (Some(name), Some(image), Some(domain), Some(container_port)) =
            (name, image, domain, container_port)
        else {
            bail!(
                "missing required flags: {}\nEither pass none of the app flags to use the interactive form, or provide all required flags.",
                missing.join(", ")
            );
        };

        let secret = match (self.env_file, self.edit) {
            (Some(path), _) => SecretSource::File(path),
            (None, true) => SecretSource::Edit,
            (None, false) => SecretSource::None,
        };

        let mut spec = AppSpec::new(name, image, container_port, domain)
            .with_subdomain(self.subdomain.unwrap_or_default())
            .with_network(self.network.unwrap_or_else(|| DEFAULT_NETWORK.to_string()))
            .with_secret(secret);
        spec.mounts = self.mounts;
        Ok(spec)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let theme = Theme::detect(cli.no_color);
    init_tracing(cli.verbose, theme.is_enabled());

    match run(cli, &theme).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", theme.error("✗ Error:"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, ansi: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .init();
}

async fn run(cli: Cli, theme: &Theme) -> anyhow::Result<()> {
    match cli.command {
        Commands::GhAction {
            branch,
            deploy_repo,
        } => {
            print_github_action(&branch, &deploy_repo, theme);
            Ok(())
        }
        Commands::Init(args) => {
            let rollout = open(cli.config_dir, cli.config)?;
            init(&rollout, args, theme).await
        }
        Commands::Deploy { messages } => {
            let rollout = open(cli.config_dir, cli.config)?;
            deploy(&rollout, &messages, theme).await
        }
        Commands::Ports => {
            let rollout = open(cli.config_dir, cli.config)?;
            ports(&rollout, theme)
        }
    }
}

/// Builds the facade. `--config-dir` beats the settings file, which beats
/// `$HOME/repos/rollouts/servers`.
fn open(config_dir: Option<PathBuf>, settings: Option<PathBuf>) -> anyhow::Result<Rollout> {
    let mut config = match &settings {
        Some(path) => RolloutConfig::from_file(path)?,
        None => RolloutConfig::default(),
    };

    config.config_dir = match (config_dir, settings) {
        (Some(dir), _) => dir,
        (None, Some(_)) => config.config_dir,
        (None, None) => {
            let home = std::env::var_os("HOME")
                .context("HOME is not set; pass --config-dir")?;
            PathBuf::from(home).join("repos/rollouts/servers")
        }
    };

    debug!(config_dir = %config.config_dir.display(), "resolved configuration");
    Ok(Rollout::new(config)?)
}

async fn init(rollout: &Rollout, args: InitArgs, theme: &Theme) -> anyhow::Result<()> {
    let dry_run = args.dry_run;
    let spec = if args.is_interactive() {
        let stdin = std::io::stdin();
        let mut stderr = std::io::stderr();
        match form::run(stdin.lock(), &mut stderr, theme).context("reading form input")? {
            Some(spec) => spec,
            None => {
                eprintln!();
                eprintln!("{}", theme.muted("Cancelled."));
                return Ok(());
            }
        }
    } else {
        args.into_spec()?
    };

    if dry_run {
        let preview = rollout.preview(&spec)?;
        let mut stdout = std::io::stdout();
        stdout.write_all(preview.descriptor.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    }

    let generated = rollout
        .generate(&spec)
        .with_context(|| format!("failed to generate config for {}", spec.name))?;
    print_summary(&spec, &generated, theme);

    if spec.secret == SecretSource::Edit {
        println!("{}", theme.prompt("→ Opening agenix editor..."));
    }
    if let Some(provision) = rollout
        .provision_secret(&spec)
        .await
        .context("failed to provision secret")?
    {
        print_secret(rollout, &provision, theme);
    }

    Ok(())
}

fn print_summary(spec: &AppSpec, generated: &Generated, theme: &Theme) {
    println!("{}", theme.header("✨ Configuration Summary"));
    println!("Name: {}", theme.success(&spec.name));
    println!("Image: {}", theme.success(&spec.image));
    println!(
        "URL: {}",
        theme.success(&format!("https://{}", spec.public_host()))
    );
    println!(
        "Container Port: {}",
        theme.success(&spec.container_port.to_string())
    );
    let host_port = if generated.newly_allocated {
        generated.host_port.to_string()
    } else {
        format!("{} (existing)", generated.host_port)
    };
    println!("Host Port: {}", theme.success(&host_port));
    println!("Network: {}", theme.success(&spec.network));
    if spec.has_secrets() {
        println!("Secrets: {}", theme.success("Enabled"));
    }
    if !spec.mounts.is_empty() {
        println!("Mounts ({}):", spec.mounts.len());
        for mount in &spec.mounts {
            println!("  - {}", theme.success(mount));
        }
    }
    println!(
        "{}",
        theme.success(&format!(
            "✓ Configuration written to {}",
            generated.path.display()
        ))
    );
}

fn print_secret(rollout: &Rollout, provision: &SecretProvision, theme: &Theme) {
    let declaration = rollout.config().secrets_path();
    match provision.registration {
        Registration::Inserted => println!(
            "{}",
            theme.success(&format!("✓ Updated {}", declaration.display()))
        ),
        Registration::AlreadyPresent => println!(
            "{}",
            theme.muted(&format!(
                "ℹ {} already lists {}",
                declaration.display(),
                provision.secret_path
            ))
        ),
    }
    if !provision.output.trim().is_empty() {
        println!("{}", theme.muted(provision.output.trim()));
    }
    println!(
        "{}",
        theme.success(&format!("✓ Secret saved to {}", provision.secret_path))
    );
}

fn print_github_action(branch: &str, deploy_repo: &str, theme: &Theme) {
    print!("{}", github_action(branch, deploy_repo));

    eprintln!("{}", theme.header("🚀 GitHub Actions Workflow"));
    eprintln!(
        "{}",
        theme.muted("Copy this workflow to .github/workflows/deploy.yml")
    );
    eprintln!();
    eprintln!("{}", theme.prompt("Next Steps:"));
    eprintln!("• Save this workflow to .github/workflows/deploy.yml");
    eprintln!(
        "• Run: {}",
        theme.success("gh secret set DEPLOY_PAT --body <TOKEN>")
    );
    eprintln!("• Push to trigger the workflow");
}

async fn deploy(rollout: &Rollout, messages: &[String], theme: &Theme) -> anyhow::Result<()> {
    let git = rollout.git();

    println!("{}", theme.header("🚀 Git Push Automation"));
    println!("• Directory: {}", theme.success(&git.root().display().to_string()));
    println!("• Command: {}", theme.muted("git add . && git commit && git push"));
    println!();

    println!("{}", theme.prompt("→ Staging changes..."));
    git.add_all().await.context("failed to stage changes")?;
    println!("{}", theme.success("✓ Changes staged successfully"));

    println!("{}", theme.prompt("→ Creating commit..."));
    match git
        .commit(&commit_message(messages))
        .await
        .context("failed to commit changes")?
    {
        CommitOutcome::NothingToCommit => {
            println!(
                "{}",
                theme.muted("ℹ No changes to commit - repository is up to date")
            );
            return Ok(());
        }
        CommitOutcome::Committed(output) => {
            println!("{}", theme.success("✓ Commit created successfully"));
            print_output(&output, theme);
        }
    }

    println!("{}", theme.prompt("→ Pushing to remote..."));
    let output = git.push().await.context("failed to push changes")?;
    println!("{}", theme.success("✓ Successfully pushed to remote"));
    print_output(&output, theme);

    println!();
    println!(
        "{}",
        theme.success("✨ Push completed! Your changes are now live.")
    );
    Ok(())
}

fn print_output(output: &str, theme: &Theme) {
    let output = output.trim();
    if !output.is_empty() {
        println!("{}", theme.muted(output));
    }
}

fn ports(rollout: &Rollout, theme: &Theme) -> anyhow::Result<()> {
    let registry = rollout.ports().context("failed to load port registry")?;

    if registry.is_empty() {
        println!(
            "{}",
            theme.muted(&format!("No ports allocated in {}", registry.range()))
        );
        return Ok(());
    }

    println!("{}", theme.header("Port Allocations"));
    let width = registry.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, port) in registry.iter() {
        println!("{name:<width$}  {}", theme.success(&port.to_string()));
    }
    println!(
        "{}",
        theme.muted(&format!(
            "{} of {} ports used, next {}",
            registry.len(),
            registry.range().len(),
            registry.next_port()
        ))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rollout").chain(args.iter().copied())).unwrap()
    }

    fn init_args(args: &[&str]) -> InitArgs {
        match parse(&[&["init"][..], args].concat()).command {
            Commands::Init(args) => args,
            _ => panic!("Expected init"),
        }
    }

    #[test]
    fn test_no_flags_is_interactive() {
        assert!(init_args(&[]).is_interactive());
        assert!(init_args(&["--dry-run"]).is_interactive());
        assert!(!init_args(&["--name", "blog"]).is_interactive());
    }

    #[test]
    fn test_flags_build_spec() {
        let spec = init_args(&[
            "--name", "blog", "--image", "ghcr.io/x/blog:latest", "--domain", "example.com",
            "--port", "3000", "--subdomain", "api", "--mount", "/srv:/data:ro", "--edit",
        ])
        .into_spec()
        .unwrap();

        assert_eq!(spec.container_port, 3000);
        assert_eq!(spec.network, "web");
        assert_eq!(spec.public_host(), "api.example.com");
        assert_eq!(spec.mounts, vec!["/srv:/data:ro"]);
        assert_eq!(spec.secret, SecretSource::Edit);
    }

    #[test]
    fn test_missing_flags_listed_together() {
        let err = init_args(&["--name", "blog", "--port", "70000"])
            .into_spec()
            .unwrap_err()
            .to_string();

        assert!(err.contains("--image, --domain, --port (1-65535)"));
    }

    #[test]
    fn test_env_file_conflicts_with_edit() {
        let result = Cli::try_parse_from([
            "rollout", "init", "--name", "blog", "--env-file", ".env", "--edit",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_deploy_messages() {
        match parse(&["deploy", "-m", "add blog", "-m", "bump"]).command {
            Commands::Deploy { messages } => {
                assert_eq!(commit_message(&messages), "add blog\nbump");
            }
            _ => panic!("Expected deploy"),
        }
    }

    #[test]
    fn test_gh_action_defaults() {
        match parse(&["gh-action"]).command {
            Commands::GhAction {
                branch,
                deploy_repo,
            } => {
                assert_eq!(branch, "main");
                assert_eq!(deploy_repo, DEFAULT_DEPLOY_REPO);
            }
            _ => panic!("Expected gh-action"),
        }
    }

    #[test]
    fn test_config_dir_flag_wins() {
        let rollout = open(Some(PathBuf::from("/srv/rollouts/servers")), None).unwrap();
        assert_eq!(
            rollout.config().config_dir,
            PathBuf::from("/srv/rollouts/servers")
        );
    }
}
