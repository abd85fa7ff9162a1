//! Build-spec rendering for hosted build runners
//!
//! A hosted runner executes the mirror job as phased shell commands. The
//! region suffix is computed by the shell at run time, never baked in here.

use serde::{Deserialize, Serialize};

use crate::definition::{MirrorJob, RegistryCredentials};

const BUILD_SPEC_VERSION: &str = "0.2";

/// Private registry host as the shell sees it once the pre-build phase has exported its parts
const AMBIENT_REGISTRY_HOST: &str =
    "$AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com$ECR_URL_SUFFIX";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    pub install: Phase,
    pub pre_build: Phase,
    pub build: Phase,
    pub post_build: Phase,
}

/// Phased command document for one mirror job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    pub phases: Phases,
}

impl BuildSpec {
    pub fn for_job(job: &MirrorJob) -> Self {
        let source = job.source.to_string();
        let destination = job.destination.to_string();

        let login = match &job.credentials {
            RegistryCredentials::Ambient => format!(
                "aws ecr get-login-password --region $AWS_DEFAULT_REGION | docker login --username AWS --password-stdin {}",
                AMBIENT_REGISTRY_HOST
            ),
            RegistryCredentials::PasswordEnv {
                username,
                password_env,
            } => format!(
                "printenv {} | docker login --username {} --password-stdin {}",
                password_env, username, job.destination.registry
            ),
        };

        let pre_build = vec![
            "echo \"Authenticating to private registry\"".to_string(),
            "aws sts get-caller-identity".to_string(),
            "export AWS_ACCOUNT_ID=$(aws sts get-caller-identity --query Account --output text)"
                .to_string(),
            "echo \"Detecting region and setting registry suffix\"".to_string(),
            "if [ \"${AWS_DEFAULT_REGION#cn}\" != \"${AWS_DEFAULT_REGION}\" ]; then export ECR_URL_SUFFIX=\".cn\"; else export ECR_URL_SUFFIX=\"\"; fi"
                .to_string(),
            login,
        ];

        let build = vec![
            format!("echo \"Pulling image: {}\"", source),
            format!("docker pull {}", source),
            format!("echo \"Tagging image as {}\"", destination),
            format!("docker tag {} {}", source, destination),
            format!("echo \"Pushing image: {}\"", destination),
            format!("docker push {}", destination),
        ];

        Self {
            version: BUILD_SPEC_VERSION.to_string(),
            phases: Phases {
                install: Phase {
                    commands: vec!["echo \"No installation commands required.\"".to_string()],
                },
                pre_build: Phase {
                    commands: pre_build,
                },
                build: Phase { commands: build },
                post_build: Phase {
                    commands: vec![format!(
                        "echo \"Image successfully pushed: {}\"",
                        destination
                    )],
                },
            },
        }
    }

    /// Every command in execution order
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        [
            &self.phases.install,
            &self.phases.pre_build,
            &self.phases.build,
            &self.phases.post_build,
        ]
        .into_iter()
        .flat_map(|phase| phase.commands.iter().map(String::as_str))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
