//! # Rollout Integration Tests
//!
//! End-to-end runs of the `init` flow against a temporary repository layout:
//!
//! ```text
//! <tmp>/
//! ├── secrets.nix
//! └── servers/
//!     ├── ports.json
//!     └── apps/<name>.nix
//! ```

use rollout_core::{
    AppSpec, PortRange, RegistryError, Registration, Rollout, RolloutConfig, RolloutError,
    SecretSource,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

const DECLARATION: &str = r#"let
  kabilan = "ssh-ed25519 AAAAC3Nza kabilan";
  server = "ssh-ed25519 AAAAC3Nzb server";
in
{
  "servers/secrets/system.age".publicKeys = [ kabilan server ];
}
"#;

/// Creates a facade rooted at `<tmp>/servers`.
fn test_rollout(temp_dir: &TempDir) -> Rollout {
    Rollout::new(test_config(temp_dir)).unwrap()
}

fn test_config(temp_dir: &TempDir) -> RolloutConfig {
    RolloutConfig::with_config_dir(temp_dir.path().join("servers"))
}

fn blog() -> AppSpec {
    AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com")
}

fn registry_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("servers/ports.json")
}

// =============================================================================
// GENERATION
// =============================================================================

#[test]
fn test_blog_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let rollout = test_rollout(&temp_dir);

    let generated = rollout.generate(&blog()).unwrap();

    assert_eq!(generated.host_port, 10000);
    assert!(generated.newly_allocated);
    assert!(generated.descriptor.contains(
        r#""traefik.http.routers.blog.rule" = "Host(`example.com`) || Host(`www.example.com`)";"#
    ));
    assert!(generated.descriptor.contains(r#"ports = [ "127.0.0.1:10000:3000" ];"#));
    assert!(!generated.descriptor.contains("environmentFiles"));
    assert!(!generated.descriptor.contains("age.secrets"));
    assert!(!generated.descriptor.contains("volumes"));

    let on_disk = std::fs::read_to_string(temp_dir.path().join("servers/apps/blog.nix")).unwrap();
    assert_eq!(on_disk, generated.descriptor);

    let registry = std::fs::read_to_string(registry_path(&temp_dir)).unwrap();
    assert_eq!(
        registry,
        "{\n  \"allocations\": {\n    \"blog\": 10000\n  },\n  \"next_port\": 10001\n}\n"
    );
}

#[test]
fn test_regeneration_is_stable() {
    let temp_dir = TempDir::new().unwrap();
    let rollout = test_rollout(&temp_dir);

    let first = rollout.generate(&blog()).unwrap();
    rollout
        .generate(&AppSpec::new("shop", "ghcr.io/x/shop:1", 8080, "shop.dev"))
        .unwrap();
    let second = rollout.generate(&blog()).unwrap();

    assert_eq!(second.host_port, first.host_port);
    assert_eq!(second.descriptor, first.descriptor);
    assert!(!second.newly_allocated);
    assert_eq!(rollout.ports().unwrap().get("shop"), Some(10001));
}

#[test]
fn test_dry_run_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let rollout = test_rollout(&temp_dir);

    let preview = rollout.preview(&blog()).unwrap();

    assert_eq!(preview.host_port, 10000);
    assert!(!preview.path.exists());
    assert!(!registry_path(&temp_dir).exists());
    assert!(!temp_dir.path().join("servers").exists());
}

#[test]
fn test_subdomain_and_mounts() {
    let temp_dir = TempDir::new().unwrap();
    let rollout = test_rollout(&temp_dir);
    let spec = blog()
        .with_subdomain("api")
        .with_network("proxy")
        .with_mount("/srv/blog:/data:rw");

    let generated = rollout.generate(&spec).unwrap();

    assert!(generated.descriptor.contains("Host(`api.example.com`) || Host(`www.api.example.com`)"));
    assert!(generated.descriptor.contains(r#"networks = [ "proxy" ];"#));
    assert!(generated.descriptor.contains(r#"volumes = [ "/srv/blog:/data:rw" ];"#));
}

// =============================================================================
// RECOVERY
// =============================================================================

#[test]
fn test_cold_start_recovers_from_descriptors() {
    let temp_dir = TempDir::new().unwrap();
    let rollout = test_rollout(&temp_dir);

    rollout.generate(&blog()).unwrap();
    rollout
        .generate(&AppSpec::new("shop", "ghcr.io/x/shop:1", 8080, "shop.dev"))
        .unwrap();
    std::fs::remove_file(registry_path(&temp_dir)).unwrap();

    let recovered = rollout.ports().unwrap();
    assert_eq!(recovered.get("blog"), Some(10000));
    assert_eq!(recovered.get("shop"), Some(10001));
    assert_eq!(recovered.next_port(), 10002);
    assert!(!registry_path(&temp_dir).exists(), "ports() must not persist");

    let docs = rollout
        .generate(&AppSpec::new("docs", "ghcr.io/x/docs:1", 80, "docs.dev"))
        .unwrap();
    assert_eq!(docs.host_port, 10002);
    assert!(registry_path(&temp_dir).exists());
}

#[test]
fn test_ports_exhausted() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.registry.port_range = PortRange::new(10000, 10001).unwrap();
    let rollout = Rollout::new(config).unwrap();

    for name in ["a", "b"] {
        rollout
            .generate(&AppSpec::new(name, "img", 80, "example.com"))
            .unwrap();
    }

    let result = rollout.generate(&AppSpec::new("c", "img", 80, "example.com"));
    assert!(matches!(
        result,
        Err(RolloutError::Registry(RegistryError::PortsExhausted {
            start: 10000,
            end: 10001
        }))
    ));
    assert!(!temp_dir.path().join("servers/apps/c.nix").exists());
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[test]
fn test_parallel_generates_get_distinct_ports() {
    let temp_dir = TempDir::new().unwrap();

    let ports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let config = test_config(&temp_dir);
                scope.spawn(move || {
                    let rollout = Rollout::new(config).unwrap();
                    let spec = AppSpec::new(
                        format!("app{i}"),
                        "ghcr.io/x/app:latest",
                        8080,
                        "example.com",
                    );
                    rollout.generate(&spec).unwrap().host_port
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: BTreeSet<_> = ports.iter().copied().collect();
    assert_eq!(unique.len(), 16);

    let registry = test_rollout(&temp_dir).ports().unwrap();
    assert_eq!(registry.len(), 16);
    for (i, port) in ports.iter().enumerate() {
        assert_eq!(registry.get(&format!("app{i}")), Some(*port));
    }
}

// =============================================================================
// SECRETS
// =============================================================================

#[test]
fn test_secret_registration_after_generate() {
    let temp_dir = TempDir::new().unwrap();
    let declaration = temp_dir.path().join("secrets.nix");
    std::fs::write(&declaration, DECLARATION).unwrap();
    let rollout = test_rollout(&temp_dir);

    let spec = blog().with_secret(SecretSource::Edit);
    let generated = rollout.generate(&spec).unwrap();
    assert!(generated
        .descriptor
        .contains(r#"environmentFiles = [ config.age.secrets."blog".path ];"#));
    assert!(generated.descriptor.contains(r#"age.secrets."blog".file = ./blog.age;"#));

    assert_eq!(rollout.register_secret("blog").unwrap(), Registration::Inserted);
    let patched = std::fs::read_to_string(&declaration).unwrap();
    assert!(patched.contains(r#""servers/apps/blog.age".publicKeys = [ kabilan server ];"#));

    assert_eq!(
        rollout.register_secret("blog").unwrap(),
        Registration::AlreadyPresent
    );
    assert_eq!(std::fs::read_to_string(&declaration).unwrap(), patched);
}

#[cfg(unix)]
#[test]
fn test_written_files_keep_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let mode = |path: PathBuf| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;

    let temp_dir = TempDir::new().unwrap();
    let declaration = temp_dir.path().join("secrets.nix");
    std::fs::write(&declaration, DECLARATION).unwrap();
    std::fs::set_permissions(&declaration, std::fs::Permissions::from_mode(0o644)).unwrap();
    let rollout = test_rollout(&temp_dir);

    rollout.generate(&blog().with_secret(SecretSource::Edit)).unwrap();
    rollout.register_secret("blog").unwrap();
    assert_eq!(mode(declaration), 0o644);

    // Fresh files get 0644 minus the umask, like a plain create would.
    let reference = temp_dir.path().join("reference");
    std::fs::write(&reference, "").unwrap();
    assert_eq!(mode(registry_path(&temp_dir)), 0o644 & mode(reference));

    let descriptor = rollout.descriptor_path("blog");
    std::fs::set_permissions(&descriptor, std::fs::Permissions::from_mode(0o664)).unwrap();
    rollout.generate(&blog().with_secret(SecretSource::Edit)).unwrap();
    assert_eq!(mode(descriptor), 0o664);
}

#[cfg(unix)]
#[tokio::test]
async fn test_init_encrypts_env_file() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("secrets.nix"), DECLARATION).unwrap();

    // Stand-in for agenix: copies stdin to the target path.
    let tool = temp_dir.path().join("fake-agenix");
    std::fs::write(&tool, "#!/bin/sh\ncat > \"$2.plain\"\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let env_file = temp_dir.path().join(".env.blog");
    std::fs::write(&env_file, "TOKEN=abc\n").unwrap();

    let mut config = test_config(&temp_dir);
    config.secrets.program = tool.to_string_lossy().into_owned();
    let rollout = Rollout::new(config).unwrap();

    let spec = blog().with_secret(SecretSource::File(env_file));
    let done = rollout.init(&spec).await.unwrap();

    assert_eq!(done.generated.host_port, 10000);
    let secret = done.secret.unwrap();
    assert_eq!(secret.registration, Registration::Inserted);
    assert_eq!(secret.secret_path, "servers/apps/blog.age");
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("servers/apps/blog.age.plain")).unwrap(),
        "TOKEN=abc\n"
    );
}

#[tokio::test]
async fn test_init_without_secret_leaves_declaration_alone() {
    let temp_dir = TempDir::new().unwrap();
    let declaration = temp_dir.path().join("secrets.nix");
    std::fs::write(&declaration, DECLARATION).unwrap();
    let rollout = test_rollout(&temp_dir);

    let done = rollout.init(&blog()).await.unwrap();

    assert!(done.secret.is_none());
    assert_eq!(std::fs::read_to_string(&declaration).unwrap(), DECLARATION);
}
