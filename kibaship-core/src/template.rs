//! Build pipeline template generator
//!
//! Produces the immutable pipeline definition for a git-source deployment
//! (clone → prepare → build for Railpack, clone → build-dockerfile for
//! Dockerfile builds) and the pipeline run that executes it.

use crate::domain::application::{BuildStrategy, GitRepositoryConfig, LocalObjectReference};
use crate::domain::deployment::Deployment;
use crate::domain::meta::{ObjectMeta, OwnerReference};
use crate::domain::pipeline::{
    Param, ParamSpec, Pipeline, PipelineResult, PipelineRun, PipelineRunSpec, PipelineRunStatus,
    PipelineRunWorkspace, PipelineSpec, PipelineTask, TaskRef, WorkspaceBinding,
    WorkspaceDeclaration, WorkspaceSource,
};
use crate::{labels, naming};

pub const DEFAULT_GIT_BRANCH: &str = "main";

pub const GIT_CLONE_TASK: &str = "tekton-task-git-clone-kibaship-com";
pub const RAILPACK_PREPARE_TASK: &str = "tekton-task-railpack-prepare-kibaship-com";
pub const RAILPACK_BUILD_TASK: &str = "tekton-task-railpack-build-kibaship-com";
pub const DOCKERFILE_BUILD_TASK: &str = "tekton-task-dockerfile-build-kibaship-com";

pub const RAILPACK_VERSION: &str = "0.1.2";
pub const RAILPACK_FRONTEND: &str = "ghcr.io/railwayapp/railpack-frontend:v0.9.0";

const TASK_RESOLVER: &str = "cluster";
const TASK_NAMESPACE: &str = "tekton-pipelines";

pub const REGISTRY_DOCKER_CONFIG: &str = "registry-docker-config";
pub const REGISTRY_CA_CERT: &str = "registry-ca-cert";
pub const APP_ENV_VARS: &str = "app-env-vars";

const WORKSPACE_STORAGE: &str = "24Gi";

// =============================================================================
// Pipeline definition
// =============================================================================

/// Builds the pipeline definition for a git-source deployment
pub fn pipeline_for(
    deployment: &Deployment,
    git: &GitRepositoryConfig,
    owner: Option<OwnerReference>,
) -> Pipeline {
    let spec = &deployment.spec;
    let workspace = naming::workspace_name(spec.uuid);

    let (tasks, build_type, build_task) = match &git.build {
        BuildStrategy::Railpack => (railpack_tasks(deployment, git, &workspace), "railpack", "build"),
        BuildStrategy::Dockerfile {
            dockerfile_path,
            build_context,
        } => (
            dockerfile_tasks(
                deployment,
                git,
                &workspace,
                dockerfile_path.as_deref().unwrap_or("Dockerfile"),
                build_context.as_deref().unwrap_or("."),
            ),
            "dockerfile",
            "build-dockerfile",
        ),
    };

    let mut labels = labels::for_component(
        spec.project_uuid,
        spec.application_uuid,
        spec.uuid,
        &naming::project_name(spec.project_uuid),
        "ci-cd-pipeline",
    );
    labels.insert(labels::BUILD_TYPE.to_string(), build_type.to_string());

    let mut metadata = ObjectMeta::new(&deployment.metadata.namespace, naming::pipeline_name(spec.uuid))
        .with_labels(labels);
    metadata.annotations.insert(
        "description".to_string(),
        format!("CI/CD pipeline for deployment {} using {} build", spec.slug, build_type),
    );
    if let Some(owner) = owner {
        metadata = metadata.with_owner(owner);
    }

    let branch = git.branch.as_deref().unwrap_or(DEFAULT_GIT_BRANCH);

    let mut results = vec![
        PipelineResult {
            name: "commit-sha".to_string(),
            description: "The commit SHA that was built".to_string(),
            value: "$(tasks.clone-repository.results.commit)".to_string(),
        },
        PipelineResult {
            name: "repository-url".to_string(),
            description: "The repository URL that was cloned".to_string(),
            value: "$(tasks.clone-repository.results.url)".to_string(),
        },
    ];
    if build_task == "build-dockerfile" {
        results.push(PipelineResult {
            name: "build-output".to_string(),
            description: "Output of the Dockerfile build".to_string(),
            value: "$(tasks.build-dockerfile.results.buildOutput)".to_string(),
        });
    }

    Pipeline {
        metadata,
        spec: PipelineSpec {
            params: vec![
                ParamSpec {
                    name: "git-commit".to_string(),
                    description: "Git commit SHA to build".to_string(),
                    default: None,
                },
                ParamSpec {
                    name: "git-branch".to_string(),
                    description: "Git branch to clone".to_string(),
                    default: Some(branch.to_string()),
                },
            ],
            workspaces: vec![
                declare(&workspace, "Shared workspace for source and build output", false),
                declare(REGISTRY_DOCKER_CONFIG, "Registry push credentials", false),
                declare(REGISTRY_CA_CERT, "Registry CA certificate", false),
                declare(APP_ENV_VARS, "Application environment variables", true),
            ],
            tasks,
            results,
        },
    }
}

fn railpack_tasks(deployment: &Deployment, git: &GitRepositoryConfig, workspace: &str) -> Vec<PipelineTask> {
    let context = git.root_directory.as_deref().unwrap_or(".");

    vec![
        clone_task(git, workspace),
        PipelineTask {
            name: "prepare".to_string(),
            run_after: vec!["clone-repository".to_string()],
            task_ref: cluster_task(RAILPACK_PREPARE_TASK),
            params: vec![
                Param::new("contextPath", context),
                Param::new("railpackVersion", RAILPACK_VERSION),
            ],
            workspaces: vec![bind("output", workspace)],
        },
        PipelineTask {
            name: "build".to_string(),
            run_after: vec!["prepare".to_string()],
            task_ref: cluster_task(RAILPACK_BUILD_TASK),
            params: vec![
                Param::new("contextPath", context),
                Param::new("railpackFrontendSource", RAILPACK_FRONTEND),
                Param::new("imageTag", image_tag(deployment)),
            ],
            workspaces: build_workspaces(workspace),
        },
    ]
}

fn dockerfile_tasks(
    deployment: &Deployment,
    git: &GitRepositoryConfig,
    workspace: &str,
    dockerfile_path: &str,
    build_context: &str,
) -> Vec<PipelineTask> {
    vec![
        clone_task(git, workspace),
        PipelineTask {
            name: "build-dockerfile".to_string(),
            run_after: vec!["clone-repository".to_string()],
            task_ref: cluster_task(DOCKERFILE_BUILD_TASK),
            params: vec![
                Param::new("dockerfilePath", dockerfile_path),
                Param::new("contextPath", build_context),
                Param::new("imageTag", image_tag(deployment)),
            ],
            workspaces: build_workspaces(workspace),
        },
    ]
}

fn clone_task(git: &GitRepositoryConfig, workspace: &str) -> PipelineTask {
    let token_secret = if git.public_access {
        ""
    } else {
        git.secret_ref.as_deref().unwrap_or("")
    };

    PipelineTask {
        name: "clone-repository".to_string(),
        run_after: Vec::new(),
        task_ref: cluster_task(GIT_CLONE_TASK),
        params: vec![
            Param::new("url", git.clone_url()),
            Param::new("branch", "$(params.git-branch)"),
            Param::new("commit", "$(params.git-commit)"),
            Param::new("token-secret", token_secret),
            Param::new("public-access", git.public_access.to_string()),
        ],
        workspaces: vec![bind("output", workspace)],
    }
}

fn cluster_task(name: &str) -> TaskRef {
    TaskRef {
        resolver: TASK_RESOLVER.to_string(),
        params: vec![
            Param::new("kind", "task"),
            Param::new("name", name),
            Param::new("namespace", TASK_NAMESPACE),
        ],
    }
}

fn build_workspaces(workspace: &str) -> Vec<WorkspaceBinding> {
    vec![
        bind("output", workspace),
        bind("docker-config", REGISTRY_DOCKER_CONFIG),
        bind("registry-ca", REGISTRY_CA_CERT),
        bind(APP_ENV_VARS, APP_ENV_VARS),
    ]
}

fn image_tag(deployment: &Deployment) -> String {
    naming::build_image(
        &deployment.metadata.namespace,
        deployment.spec.application_uuid,
        deployment.spec.uuid,
    )
}

fn bind(name: &str, workspace: &str) -> WorkspaceBinding {
    WorkspaceBinding {
        name: name.to_string(),
        workspace: workspace.to_string(),
    }
}

fn declare(name: &str, description: &str, optional: bool) -> WorkspaceDeclaration {
    WorkspaceDeclaration {
        name: name.to_string(),
        description: description.to_string(),
        optional,
    }
}

// =============================================================================
// Pipeline run
// =============================================================================

/// Resolves the branch to build: deployment, then application, then `main`
pub fn resolve_branch<'a>(deployment_branch: Option<&'a str>, git: &'a GitRepositoryConfig) -> &'a str {
    deployment_branch
        .filter(|b| !b.is_empty())
        .or(git.branch.as_deref().filter(|b| !b.is_empty()))
        .unwrap_or(DEFAULT_GIT_BRANCH)
}

/// Builds the pipeline run for the deployment's current generation
pub fn pipeline_run_for(
    deployment: &Deployment,
    git: &GitRepositoryConfig,
    commit_sha: &str,
    deployment_branch: Option<&str>,
    owner: Option<OwnerReference>,
) -> PipelineRun {
    let spec = &deployment.spec;
    let pipeline = naming::pipeline_name(spec.uuid);
    let run_name = naming::pipeline_run_name(spec.uuid, deployment.metadata.generation);

    let mut labels = labels::for_component(
        spec.project_uuid,
        spec.application_uuid,
        spec.uuid,
        &format!("pipeline-run-{}", spec.slug),
        "ci-cd-pipeline-run",
    );
    labels.insert(
        labels::DEPLOYMENT_NAME.to_string(),
        labels::truncate_label(&deployment.metadata.name),
    );

    let mut metadata = ObjectMeta::new(&deployment.metadata.namespace, run_name).with_labels(labels);
    metadata.annotations.insert(
        "description".to_string(),
        format!("CI/CD pipeline run for deployment {}", spec.slug),
    );
    if let Some(owner) = owner {
        metadata = metadata.with_owner(owner);
    }

    PipelineRun {
        metadata,
        spec: PipelineRunSpec {
            pipeline_ref: LocalObjectReference { name: pipeline },
            params: vec![
                Param::new("git-commit", commit_sha),
                Param::new("git-branch", resolve_branch(deployment_branch, git)),
            ],
            service_account_name: naming::service_account_name(spec.project_uuid),
            workspaces: vec![
                PipelineRunWorkspace {
                    name: naming::workspace_name(spec.uuid),
                    source: WorkspaceSource::VolumeClaimTemplate {
                        access_mode: "ReadWriteOnce".to_string(),
                        storage: WORKSPACE_STORAGE.to_string(),
                    },
                },
                secret_workspace(REGISTRY_DOCKER_CONFIG, REGISTRY_DOCKER_CONFIG),
                secret_workspace(REGISTRY_CA_CERT, REGISTRY_CA_CERT),
                secret_workspace(APP_ENV_VARS, &naming::deployment_secret_name(spec.uuid)),
            ],
        },
        status: PipelineRunStatus::default(),
    }
}

fn secret_workspace(name: &str, secret: &str) -> PipelineRunWorkspace {
    PipelineRunWorkspace {
        name: name.to_string(),
        source: WorkspaceSource::Secret {
            secret_name: secret.to_string(),
        },
    }
}
