//! End-to-end resource cycles against a mocked host.

use fetch::{MemoryFetcher, RemoteSource};
use reconcile::descriptor::{
    AptRepository, ArchiveType, DesiredState, ExecResource, ExecSpec, FileResource, FileState,
    FileSource, Interpreter, NamedPackage, PackageResource, RemoteFile, RepositoryResource,
};
use reconcile::{AgentContext, AgentPaths, Error, OsPolicyResource, Platform, PolicyResource};
use runner::{CommandOutput, MockRunner};
use std::path::Path;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

struct Host {
    root: TempDir,
    mock: MockRunner,
    fetcher: MemoryFetcher,
    ctx: Arc<AgentContext>,
}

impl Host {
    fn new(programs: &[&str]) -> Self {
        let root = tempdir().unwrap();
        let mut mock = MockRunner::new();
        for program in programs {
            mock = mock.with_program(program);
        }
        let fetcher = MemoryFetcher::new();
        let ctx = Arc::new(
            AgentContext::new(
                Arc::new(mock.clone()),
                Arc::new(fetcher.clone()),
                AgentPaths::with_root(root.path()),
            )
            .with_platform(Platform::Unix),
        );
        Self {
            root,
            mock,
            fetcher,
            ctx,
        }
    }

    fn resource(&self) -> OsPolicyResource {
        OsPolicyResource::new(Arc::clone(&self.ctx))
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.root.path().join(relative)
    }
}

fn apt_package(id: &str, name: &str) -> PolicyResource {
    PolicyResource {
        id: id.into(),
        pkg: Some(PackageResource {
            desired_state: DesiredState::Installed,
            apt: Some(NamedPackage { name: name.into() }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn apt_repository_body_and_check_state() {
    let host = Host::new(&["apt-get"]);
    let descriptor = PolicyResource {
        id: "repo".into(),
        repository: Some(RepositoryResource {
            apt: Some(AptRepository {
                archive_type: ArchiveType::Deb,
                uri: "uri".into(),
                distribution: "distribution".into(),
                components: vec!["c1".into(), "c2".into()],
                gpg_key: String::new(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut resource = host.resource();
    resource.validate(&descriptor).unwrap();
    let repo = resource.managed_resources().unwrap().repositories[0].clone();
    assert_eq!(
        repo.repo_file_contents,
        "# Repo file managed by Google OSConfig agent\ndeb uri distribution c1 c2\n"
    );
    assert_eq!(repo.repo_file_path.parent().unwrap(), host.path("etc/apt/sources.list.d"));

    assert!(!resource.check_state().unwrap());
    resource.enforce_state().unwrap();
    assert!(resource.in_desired_state());
    assert!(resource.check_state().unwrap());
    assert_eq!(
        std::fs::read_to_string(&repo.repo_file_path).unwrap(),
        repo.repo_file_contents
    );

    std::fs::write(&repo.repo_file_path, "tampered").unwrap();
    assert!(!resource.check_state().unwrap());
}

#[test]
fn package_without_system_package_fails_validation() {
    let host = Host::new(&["apt-get"]);
    let descriptor = PolicyResource {
        id: "empty-pkg".into(),
        pkg: Some(PackageResource {
            desired_state: DesiredState::Installed,
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut resource = host.resource();
    let err = resource.validate(&descriptor).unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
    assert!(resource.managed_resources().is_none());
}

#[test]
fn installed_cache_is_shared_and_invalidated_by_enforce() {
    let host = Host::new(&["apt-get"]);
    host.mock
        .respond("dpkg-query", &["-W"], CommandOutput::ok("vim installed\n"));
    host.mock.respond("apt-get", &[], CommandOutput::ok(""));

    let mut vim = host.resource();
    vim.validate(&apt_package("vim", "vim")).unwrap();
    let mut curl = host.resource();
    curl.validate(&apt_package("curl", "curl")).unwrap();

    assert!(vim.check_state().unwrap());
    assert!(!curl.check_state().unwrap());
    assert_eq!(host.mock.call_count("dpkg-query"), 1);

    host.mock.respond(
        "dpkg-query",
        &["-W"],
        CommandOutput::ok("vim installed\ncurl installed\n"),
    );
    curl.enforce_state().unwrap();
    assert!(curl.check_state().unwrap());
    assert_eq!(host.mock.call_count("dpkg-query"), 2);
}

#[test]
fn exec_exit_codes() {
    let host = Host::new(&[]);
    let descriptor = PolicyResource {
        id: "exec".into(),
        exec: Some(ExecResource {
            validate: ExecSpec {
                script: Some("test -f /etc/marker && exit 100; exit 101".into()),
                interpreter: Interpreter::Shell,
                ..Default::default()
            },
            enforce: Some(ExecSpec {
                script: Some("touch /etc/marker && exit 100".into()),
                interpreter: Interpreter::Shell,
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    let mut resource = host.resource();
    resource.validate(&descriptor).unwrap();
    assert!(resource.managed_resources().unwrap().packages.is_empty());

    host.mock.respond("/bin/sh", &[], CommandOutput::new(101, "", ""));
    assert!(!resource.check_state().unwrap());

    host.mock.respond("/bin/sh", &[], CommandOutput::new(100, "", ""));
    resource.enforce_state().unwrap();
    assert!(resource.check_state().unwrap());

    host.mock.respond("/bin/sh", &[], CommandOutput::new(3, "", "denied"));
    let err = resource.check_state().unwrap_err();
    assert!(err.to_string().contains("denied"));
}

#[test]
fn file_absent_cycle() {
    let host = Host::new(&[]);
    let target = host.path("etc/obsolete.conf");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, "old").unwrap();

    let mut resource = host.resource();
    resource
        .validate(&PolicyResource {
            id: "obsolete".into(),
            file: Some(FileResource {
                path: target.display().to_string(),
                state: FileState::Absent,
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();

    assert!(!resource.check_state().unwrap());
    resource.enforce_state().unwrap();
    assert!(!target.exists());
    assert!(resource.check_state().unwrap());
}

#[test]
fn remote_file_contents_match() {
    let host = Host::new(&[]);
    let uri = "https://example.com/motd";
    host.fetcher.insert(RemoteSource::http(uri), "welcome\n");
    let target = host.path("etc/motd");

    let mut resource = host.resource();
    resource
        .validate(&PolicyResource {
            id: "motd".into(),
            file: Some(FileResource {
                path: target.display().to_string(),
                state: FileState::ContentsMatch,
                file: Some(FileSource {
                    remote: Some(RemoteFile {
                        uri: uri.into(),
                        sha256_checksum: fetch::sha256_hex(b"welcome\n"),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();

    assert!(!resource.check_state().unwrap());
    resource.enforce_state().unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "welcome\n");
    assert!(resource.check_state().unwrap());
}

#[test]
fn cleanup_persists_package_info_cache() {
    let host = Host::new(&["dpkg"]);
    let deb = host.path("foo.deb");
    std::fs::write(&deb, "deb").unwrap();
    host.mock.respond(
        "dpkg-deb",
        &["-f"],
        CommandOutput::ok("Package: foo\nArchitecture: all\nVersion: 2\n"),
    );

    let descriptor = PolicyResource {
        id: "foo".into(),
        pkg: Some(PackageResource {
            desired_state: DesiredState::Installed,
            deb: Some(reconcile::descriptor::ArtifactPackage {
                source: FileSource {
                    local_path: Some(deb.display().to_string()),
                    ..Default::default()
                },
                pull_deps: false,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    {
        let mut resource = host.resource();
        resource.validate(&descriptor).unwrap();
        // Dropping runs cleanup.
    }
    let cache_file = host.ctx.paths.package_info_cache_file();
    assert!(Path::new(&cache_file).exists());
    let saved = std::fs::read_to_string(&cache_file).unwrap();
    assert!(saved.contains("\"name\":\"foo\""));
}

#[test]
fn remote_deb_downloaded_once_then_again_for_enforce() {
    let host = Host::new(&["dpkg"]);
    let uri = "https://example.com/pool/foo_2_all.deb";
    host.fetcher.insert(RemoteSource::http(uri), "deb payload");
    host.mock.respond(
        "dpkg-deb",
        &["-f"],
        CommandOutput::ok("Package: foo\nArchitecture: all\nVersion: 2\n"),
    );
    host.mock.respond("dpkg", &["--install"], CommandOutput::ok(""));

    let descriptor = PolicyResource {
        id: "foo".into(),
        pkg: Some(PackageResource {
            desired_state: DesiredState::Installed,
            deb: Some(reconcile::descriptor::ArtifactPackage {
                source: FileSource {
                    remote: Some(RemoteFile {
                        uri: uri.into(),
                        sha256_checksum: fetch::sha256_hex(b"deb payload"),
                    }),
                    ..Default::default()
                },
                pull_deps: false,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let source = RemoteSource::http(uri);

    // Cache miss: downloaded and inspected.
    let mut first = host.resource();
    first.validate(&descriptor).unwrap();
    assert_eq!(host.fetcher.fetch_count(&source), 1);
    assert_eq!(host.mock.call_count("dpkg-deb"), 1);

    // Cache hit: metadata reused, no download yet.
    let mut second = host.resource();
    second.validate(&descriptor).unwrap();
    assert_eq!(host.fetcher.fetch_count(&source), 1);
    assert_eq!(host.mock.call_count("dpkg-deb"), 1);
    match &second.managed_resources().unwrap().packages[0] {
        reconcile::ManagedPackage::Deb {
            local_path, info, ..
        } => {
            assert!(local_path.is_none());
            assert_eq!(info.name, "foo");
        }
        other => panic!("unexpected package {other:?}"),
    }

    // Enforce fetches the artifact it skipped.
    second.enforce_state().unwrap();
    assert_eq!(host.fetcher.fetch_count(&source), 2);
    assert_eq!(host.mock.call_count("dpkg-deb"), 1);

    let install = host
        .mock
        .calls()
        .into_iter()
        .find(|c| c.program == "dpkg")
        .unwrap();
    assert_eq!(install.args.len(), 2);
    assert_eq!(install.args[0], "--install");
    let installed = Path::new(&install.args[1]);
    assert!(installed.is_absolute());
    assert!(installed.ends_with("pkg.deb"));
    assert_eq!(std::fs::read(installed).unwrap(), b"deb payload");

    second.cleanup().unwrap();
    assert!(!installed.exists());
}
