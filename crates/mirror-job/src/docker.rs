//! Container tooling backed by the `aws` and `docker` CLIs

use async_trait::async_trait;
use mirror_gate_common::ImageReference;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::definition::RegistryCredentials;
use crate::error::{MirrorError, Result};
use crate::tooling::{ContainerTooling, Digest};

/// Username the registry expects with a password from `get-login-password`
const AMBIENT_LOGIN_USER: &str = "AWS";

/// Shells out to the docker daemon of the executing machine
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_bin: String,
    aws_bin: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            aws_bin: "aws".to_string(),
        }
    }

    /// Use binaries at other paths
    pub fn with_binaries(docker_bin: impl Into<String>, aws_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            aws_bin: aws_bin.into(),
        }
    }

    /// Run a command to completion, returning stdout
    async fn exec(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("Executing: {}", command);

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MirrorError::Spawn {
                command: command.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|source| MirrorError::Spawn {
                    command: command.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| MirrorError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MirrorError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Digest of a local image from its repo digests
    async fn inspect_digest(&self, image: &ImageReference) -> Result<Digest> {
        let reference = image.to_string();
        let output = self
            .exec(
                &self.docker_bin,
                &[
                    "image",
                    "inspect",
                    "--format",
                    "{{index .RepoDigests 0}}",
                    reference.as_str(),
                ],
                None,
            )
            .await?;

        output
            .trim()
            .split_once('@')
            .map(|(_, digest)| digest.to_string())
            .ok_or_else(|| MirrorError::MissingDigest(format!("docker image inspect {}", reference)))
    }
}

#[async_trait]
impl ContainerTooling for DockerCli {
    async fn caller_identity(&self) -> Result<String> {
        let output = self
            .exec(
                &self.aws_bin,
                &["sts", "get-caller-identity", "--query", "Account", "--output", "text"],
                None,
            )
            .await?;
        Ok(output.trim().to_string())
    }

    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
        region: &str,
    ) -> Result<()> {
        let (username, password) = match credentials {
            RegistryCredentials::Ambient => {
                let password = self
                    .exec(
                        &self.aws_bin,
                        &["ecr", "get-login-password", "--region", region],
                        None,
                    )
                    .await?;
                (AMBIENT_LOGIN_USER.to_string(), password.trim().to_string())
            }
            RegistryCredentials::PasswordEnv {
                username,
                password_env,
            } => {
                let password = std::env::var(password_env)
                    .map_err(|_| MirrorError::MissingCredential(password_env.clone()))?;
                (username.clone(), password)
            }
        };

        self.exec(
            &self.docker_bin,
            &["login", "--username", username.as_str(), "--password-stdin", registry_host],
            Some(password.as_bytes()),
        )
        .await?;

        info!("Logged in to {}", registry_host);
        Ok(())
    }

    async fn pull(&self, image: &ImageReference) -> Result<Digest> {
        let reference = image.to_string();
        let output = self
            .exec(&self.docker_bin, &["pull", reference.as_str()], None)
            .await?;

        match parse_digest(&output) {
            Some(digest) => Ok(digest),
            None => self.inspect_digest(image).await,
        }
    }

    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        let source = source.to_string();
        let target = target.to_string();
        self.exec(&self.docker_bin, &["tag", source.as_str(), target.as_str()], None)
            .await?;
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> Result<Digest> {
        let reference = image.to_string();
        let output = self
            .exec(&self.docker_bin, &["push", reference.as_str()], None)
            .await?;

        parse_digest(&output).ok_or_else(|| MirrorError::MissingDigest(format!("docker push {}", reference)))
    }
}

/// Find the digest docker prints after `Digest:` (pull) or `digest:` (push)
fn parse_digest(output: &str) -> Option<Digest> {
    output.lines().find_map(|line| {
        let lower = line.to_ascii_lowercase();
        let start = lower.find("digest: ")? + "digest: ".len();
        line[start..]
            .split_whitespace()
            .next()
            .filter(|digest| digest.contains(':'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pull_digest() {
        let output = "v1: Pulling from app\n\
                      Digest: sha256:9b2a6c0f\n\
                      Status: Downloaded newer image for public-registry/app:v1\n";
        assert_eq!(parse_digest(output), Some("sha256:9b2a6c0f".to_string()));
    }

    #[test]
    fn test_parse_push_digest() {
        let output = "The push refers to repository [registry/app]\n\
                      5f70bf18a086: Layer already exists\n\
                      v1: digest: sha256:3e1f8a77 size: 529\n";
        assert_eq!(parse_digest(output), Some("sha256:3e1f8a77".to_string()));
    }

    #[test]
    fn test_parse_digest_missing() {
        assert_eq!(parse_digest("Status: Image is up to date"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let cli = DockerCli::with_binaries("/nonexistent/docker", "/nonexistent/aws");
        let err = cli.caller_identity().await.unwrap_err();
        assert!(matches!(err, MirrorError::Spawn { .. }));
    }
}
