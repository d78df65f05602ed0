//! The example table: which programs are deployed, how they are edited,
//! and which endpoints are checked after each step.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SuiteConfig;
use crate::error::E2eError;
use crate::request::Headers;
use crate::suite::{
    runtime_validation, step_dir, EditDir, ExampleSuite, ProgramTestOptions, RuntimeValidation,
    StackInfo,
};
use crate::target::Target;
use crate::transport::{Sleeper, Transport};
use crate::validator::PollingValidator;

pub const EKS_MIGRATE_NODEGROUPS: &str = "aws-ts-eks-migrate-nodegroups";
pub const AKS_HELM: &str = "azure-ts-aks-helm";
pub const AKS_MULTICLUSTER: &str = "azure-ts-aks-multicluster";

/// Virtual host the nginx ingress routes the echoserver under
pub const ECHOSERVER_HOST: &str = "apps.example.com";

const TEST_PASSWORD: &str = "testTEST1234+_^$";
const TEST_SSH_PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQDeREOgHTUgPT00PTr7iQF9JwZQ4QF1VeaLk2nHKRvWYOCiky6hDtzhmLM0k0Ib9Y7cwFbhObR+8yZpCgfSX3Hc3w2I1n6lXFpMfzr+wdbpx97N4fc1EHGUr9qT3UM1COqN6e/BEosQcMVaXSCpjqL1jeNaRDAnAS2Y3q1MFeXAvj9rwq8EHTqqAc1hW9Lq4SjSiA98STil5dGw6DWRhNtf6zs4UBy8UipKsmuXtclR0gKnoEP83ahMJOpCIjuknPZhb+HsiNjFWf+Os9U6kaS5vGrbXC8nggrVE57ow88pLCBL+3mBk1vBg6bJuLBCp2WTqRzDMhSDQ3AcWqkucGqf e2e@examples";

/// Build the full example table on top of `validator`
pub fn examples_suite<T, S>(
    config: SuiteConfig,
    validator: Arc<PollingValidator<T, S>>,
) -> ExampleSuite
where
    T: Transport + 'static,
    S: Sleeper + 'static,
{
    let base = ProgramTestOptions {
        tracing: config.tracing_endpoint.clone(),
        expect_refresh_changes: true,
        overrides: config.node_overrides.clone(),
        quick: true,
        skip_refresh: true,
        ..Default::default()
    };

    let builder = ExampleSuite::builder(config).base(base);
    let settings = builder.config().clone();

    let eks_dir = builder.example_dir(EKS_MIGRATE_NODEGROUPS);
    let echoserver = echoserver_check(validator.clone(), settings.edit_max_wait);
    let eks = ProgramTestOptions {
        dir: eks_dir.clone(),
        config: BTreeMap::from([("aws:region".to_string(), settings.aws_region.clone())]),
        dependencies: vec!["@pulumi/eks".to_string()],
        edit_dirs: vec![
            // Add the new, larger node group
            EditDir::new(step_dir(&eks_dir, "step1"))
                .additive()
                .validate_with(echoserver.clone()),
            // Retarget NGINX onto the new node group via rolling update
            EditDir::new(step_dir(&eks_dir, "step2"))
                .additive()
                .validate_with(echoserver.clone()),
            // Remove the old node group
            EditDir::new(step_dir(&eks_dir, "step3"))
                .additive()
                .validate_with(echoserver),
        ],
        ..Default::default()
    };

    let aks_helm = ProgramTestOptions {
        dir: builder.example_dir(AKS_HELM),
        config: azure_config(&settings),
        extra_runtime_validation: Some(contains_check(
            validator,
            "serviceIP",
            "It works!",
            settings.default_max_wait,
        )),
        ..Default::default()
    };

    // TODO: re-enable validation once the azurerm provider exposes the
    // service principal before cluster creation.
    let aks_multicluster = ProgramTestOptions {
        dir: builder.example_dir(AKS_MULTICLUSTER),
        config: azure_config(&settings),
        ..Default::default()
    };

    builder
        .case(eks)
        .long_case(aks_helm)
        .long_case(aks_multicluster)
        .build()
}

fn azure_config(config: &SuiteConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "azure:environment".to_string(),
            config.azure_environment.clone(),
        ),
        ("password".to_string(), TEST_PASSWORD.to_string()),
        ("sshPublicKey".to_string(), TEST_SSH_PUBLIC_KEY.to_string()),
    ])
}

/// `<nginxServiceUrl>/echoserver` routed as [`ECHOSERVER_HOST`] must serve
/// a non-empty body
fn echoserver_check<T, S>(
    validator: Arc<PollingValidator<T, S>>,
    max_wait: Duration,
) -> RuntimeValidation
where
    T: Transport + 'static,
    S: Sleeper + 'static,
{
    runtime_validation(move |stack: StackInfo| {
        let validator = validator.clone();
        async move {
            let endpoint = Target::from_output(stack.output("nginxServiceUrl"))?.join("/echoserver");
            let headers = Headers::new().with("Host", ECHOSERVER_HOST);
            validator
                .validate_target(&endpoint, &headers, max_wait, |body| !body.is_empty())
                .await?;
            Ok::<(), E2eError>(())
        }
    })
}

/// The endpoint in output `key` must serve a body containing `needle`
fn contains_check<T, S>(
    validator: Arc<PollingValidator<T, S>>,
    key: &'static str,
    needle: &'static str,
    max_wait: Duration,
) -> RuntimeValidation
where
    T: Transport + 'static,
    S: Sleeper + 'static,
{
    runtime_validation(move |stack: StackInfo| {
        let validator = validator.clone();
        async move {
            validator
                .validate(stack.output(key), &Headers::new(), max_wait, |body| {
                    body.contains(needle)
                })
                .await?;
            Ok::<(), E2eError>(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(short: bool) -> ExampleSuite {
        let config = SuiteConfig {
            short,
            examples_root: "/ex".into(),
            aws_region: "us-east-2".to_string(),
            tracing_endpoint: Some("https://collector.local/spans".to_string()),
            ..Default::default()
        };
        examples_suite(config, Arc::new(PollingValidator::new()))
    }

    #[test]
    fn test_table_shape() {
        let suite = suite(false);
        let names: Vec<String> = suite.cases().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec![EKS_MIGRATE_NODEGROUPS, AKS_HELM, AKS_MULTICLUSTER]);

        let eks = &suite.find(EKS_MIGRATE_NODEGROUPS).unwrap().options;
        assert_eq!(eks.config["aws:region"], "us-east-2");
        assert_eq!(eks.dependencies, vec!["@pulumi/eks"]);
        assert_eq!(eks.edit_dirs.len(), 3);
        assert!(eks.edit_dirs.iter().all(|e| e.additive));
        assert!(eks.edit_dirs.iter().all(|e| e.extra_runtime_validation.is_some()));
        assert_eq!(
            eks.edit_dirs[2].dir,
            std::path::PathBuf::from("/ex/aws-ts-eks-migrate-nodegroups/steps/step3")
        );

        // base options reach every case
        for case in suite.cases() {
            assert!(case.options.quick && case.options.skip_refresh);
            assert!(case.options.expect_refresh_changes);
            assert_eq!(
                case.options.tracing.as_deref(),
                Some("https://collector.local/spans")
            );
        }

        let helm = &suite.find(AKS_HELM).unwrap();
        assert!(helm.long);
        assert_eq!(helm.options.config["azure:environment"], "public");
        assert!(helm.options.extra_runtime_validation.is_some());
        assert!(suite
            .find(AKS_MULTICLUSTER)
            .unwrap()
            .options
            .extra_runtime_validation
            .is_none());
    }

    #[test]
    fn test_short_mode_runs_only_eks() {
        let suite = suite(true);
        let selected: Vec<String> = suite.selected().iter().map(|c| c.name()).collect();
        assert_eq!(selected, vec![EKS_MIGRATE_NODEGROUPS]);
    }

    #[tokio::test]
    async fn test_echoserver_check_rejects_missing_output() {
        let suite = suite(false);
        let eks = &suite.find(EKS_MIGRATE_NODEGROUPS).unwrap().options;

        let err = eks.edit_dirs[0]
            .validate_stack(StackInfo::new("dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::TargetNotString(_)));
    }
}
