//! Built-in scenarios for the MSBuild scanner against the bundled fixtures.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::exec::BuildRequest;
use crate::model::{ProjectKey, QualityProfileBinding, ServiceVersion};
use crate::service::CustomRule;
use crate::session::{BeginConfig, EndConfig};
use crate::verify::Expectation;

use super::model::{ExpectedOutcome, Precondition, Provisioning, Scenario, SessionPlan};

pub const PROJECT_KEY: &str = "my.project";
pub const MODULE_KEY: &str = "my.project:my.project:1049030E-AC7A-49D0-BEDC-F414C5C7DDD8";
pub const FILE_KEY: &str = "my.project:my.project:1049030E-AC7A-49D0-BEDC-F414C5C7DDD8:Foo.cs";

const NORMAL_PROJECT_KEY: &str = "my.project:my.project:B93B287C-47DB-4406-9EAB-653BCF7D20DC";
const TEST_PROJECT_KEY: &str = "my.project:my.project:2DC588FC-16FB-42F8-9FDA-193852E538AF";

const PROJECT_UNDER_TEST: &str = "ProjectUnderTest";
const DEFAULT_PROFILE: &str = "ProjectUnderTest/TestQualityProfile.xml";

const NCLOC: &str = "ncloc";
const LINES: &str = "lines";

/// Every built-in scenario, in a stable order.
pub fn builtin() -> Result<Vec<Scenario>, ConfigError> {
    Ok(vec![
        sample()?,
        no_name_and_version()?,
        excluded_and_test()?,
        multi_language()?,
        parameters()?,
        custom_fxcop_rule()?,
        verbose()?,
        all_projects_excluded()?,
        no_active_rule()?,
        help(),
    ])
}

/// Scenarios by name, in the order requested. An empty list selects all.
pub fn select(names: &[String]) -> Result<Vec<Scenario>, ConfigError> {
    let all = builtin()?;
    if names.is_empty() {
        return Ok(all);
    }
    names
        .iter()
        .map(|name| {
            all.iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownScenario(name.clone()))
        })
        .collect()
}

fn key(raw: &str) -> Result<ProjectKey, ConfigError> {
    ProjectKey::new(raw)
}

fn cs(profile: &str) -> QualityProfileBinding {
    QualityProfileBinding::new("cs", profile)
}

fn provisioning(
    name: &str,
    profiles: &[&str],
    bindings: Vec<QualityProfileBinding>,
) -> Result<Provisioning, ConfigError> {
    Ok(Provisioning {
        project_key: key(PROJECT_KEY)?,
        project_name: name.to_string(),
        profiles: profiles.iter().map(|p| p.to_string()).collect(),
        bindings,
        rules: vec![],
    })
}

fn success(checks: Vec<Expectation>) -> ExpectedOutcome {
    ExpectedOutcome::Success {
        begin_logs: vec![],
        checks,
    }
}

fn sample_checks() -> Result<Vec<Expectation>, ConfigError> {
    Ok(vec![
        Expectation::issue_count(4),
        Expectation::measure(key(FILE_KEY)?, NCLOC, 23.0),
        Expectation::measure(key(PROJECT_KEY)?, NCLOC, 37.0),
        Expectation::measure(key(FILE_KEY)?, LINES, 58.0),
    ])
}

fn sample() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "sample",
        "Single C# project: 4 issues and fixed line counts",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning("sample", &[DEFAULT_PROFILE], vec![cs("ProfileForTest")])?,
            begin: BeginConfig::new(PROJECT_KEY).name("sample").version("1.0"),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(sample_checks()?),
        },
    ))
}

fn no_name_and_version() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "no-name-and-version",
        "Begin with only a project key yields the same results as sample",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning("sample", &[DEFAULT_PROFILE], vec![cs("ProfileForTest")])?,
            begin: BeginConfig::new(PROJECT_KEY),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(sample_checks()?),
        },
    )
    .requires(Precondition::MinServiceVersion {
        version: ServiceVersion::new(6, 1),
    }))
}

fn excluded_and_test() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "excluded-and-test",
        "Excluded and test projects contribute no issues or lines",
        "ExcludedTest",
        SessionPlan {
            provisioning: provisioning(
                "excludedAndTest",
                &[DEFAULT_PROFILE],
                vec![cs("ProfileForTest")],
            )?,
            begin: BeginConfig::new(PROJECT_KEY)
                .name("excludedAndTest")
                .version("1.0"),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(vec![
                Expectation::issue_count(4),
                Expectation::issue_count_under(key(NORMAL_PROJECT_KEY)?, 4),
                Expectation::issue_count_under(key(TEST_PROJECT_KEY)?, 0),
                Expectation::measure(key(PROJECT_KEY)?, NCLOC, 45.0),
                Expectation::measure(key(NORMAL_PROJECT_KEY)?, NCLOC, 45.0),
            ]),
        },
    ))
}

fn multi_language() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "multi-language",
        "C# and VB.NET projects analysed with one profile per language",
        "ConsoleMultiLanguage",
        SessionPlan {
            provisioning: provisioning(
                "multilang",
                &[
                    "ConsoleMultiLanguage/TestQualityProfileCSharp.xml",
                    "ConsoleMultiLanguage/TestQualityProfileVBNet.xml",
                ],
                vec![
                    cs("ProfileForTestCSharp"),
                    QualityProfileBinding::new("vbnet", "ProfileForTestVBNet"),
                ],
            )?,
            begin: BeginConfig::new(PROJECT_KEY)
                .name("multilang")
                .version("1.0")
                .verbose(true),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(vec![
                Expectation::issue_count(8),
                Expectation::rules_contain([
                    "vbnet:S3385",
                    "vbnet:S2358",
                    "fxcop:DoNotRaiseReservedExceptionTypes",
                    "fxcop:DoNotPassLiteralsAsLocalizedParameters",
                    "fxcop-vbnet:AvoidUnusedPrivateFields",
                    "fxcop-vbnet:AvoidUncalledPrivateCode",
                    "csharpsquid:S2228",
                    "csharpsquid:S1134",
                ]),
                Expectation::measure(key(PROJECT_KEY)?, NCLOC, 68.0),
            ]),
        },
    ))
}

fn parameters() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "parameters",
        "Rule parameters from the profile reach the analyzer",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning(
                "parameters",
                &["ProjectUnderTest/TestQualityProfileParameters.xml"],
                vec![cs("ProfileForTestParameters")],
            )?,
            begin: BeginConfig::new(PROJECT_KEY).name("parameters").version("1.0"),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(vec![
                Expectation::issue_count(1),
                Expectation::rules_contain(["csharpsquid:S107"]),
                Expectation::issue_with_message(
                    "csharpsquid:S107",
                    "Method has 3 parameters, which is greater than the 2 authorized.",
                ),
            ]),
        },
    ))
}

fn custom_fxcop_rule() -> Result<Scenario, ConfigError> {
    let mut plan = SessionPlan {
        provisioning: provisioning(
            "sample",
            &["ProjectUnderTest/TestQualityProfileFxCop.xml"],
            vec![cs("ProfileForTestFxCop")],
        )?,
        begin: BeginConfig::new(PROJECT_KEY).name("sample").version("1.0"),
        build: BuildRequest::rebuild(),
        end: EndConfig::default(),
        outcome: success(vec![
            Expectation::issue_count(1),
            Expectation::rules_contain(["fxcop:customfxcop"]),
        ]),
    };
    plan.provisioning.rules.push(CustomRule {
        template_key: "fxcop:CustomRuleTemplate".into(),
        custom_key: "customfxcop".into(),
        name: "customfxcop".into(),
        severity: "MAJOR".into(),
        description: "custom rule".into(),
        params: BTreeMap::from([("CheckId".to_string(), "CA2201".to_string())]),
    });
    Ok(Scenario::session(
        "custom-fxcop-rule",
        "Custom rule created from an FxCop template raises its issue",
        PROJECT_UNDER_TEST,
        plan,
    ))
}

fn verbose() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "verbose",
        "sonar.verbose=true switches begin to debug logging",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning("verbose", &[DEFAULT_PROFILE], vec![cs("ProfileForTest")])?,
            begin: BeginConfig::new(PROJECT_KEY)
                .name("verbose")
                .version("1.0")
                .verbose(true),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: ExpectedOutcome::Success {
                begin_logs: vec![
                    "Downloading from http://localhost".into(),
                    "sonar.verbose=true was specified - setting the log verbosity to 'Debug'".into(),
                ],
                checks: vec![],
            },
        },
    ))
}

fn all_projects_excluded() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "all-projects-excluded",
        "Excluding every project makes end fail with no analysable projects",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning("sample", &[DEFAULT_PROFILE], vec![cs("ProfileForTest")])?,
            begin: BeginConfig::new(PROJECT_KEY).name("sample").version("1.0"),
            build: BuildRequest::rebuild().exclude_all_projects(),
            end: EndConfig::default(),
            outcome: ExpectedOutcome::Failure {
                end_logs: vec![
                    "The exclude flag has been set so the project will not be analyzed by SonarQube."
                        .into(),
                    "No analysable projects were found. SonarQube analysis will not be performed. \
                     Check the build summary report for details."
                        .into(),
                ],
                checks: vec![
                    Expectation::NotRegistered {
                        component: key(MODULE_KEY)?,
                    },
                    Expectation::measure_absent(key(PROJECT_KEY)?, NCLOC),
                ],
            },
        },
    ))
}

fn no_active_rule() -> Result<Scenario, ConfigError> {
    Ok(Scenario::session(
        "no-active-rule",
        "An empty profile still analyses successfully with no issues",
        PROJECT_UNDER_TEST,
        SessionPlan {
            provisioning: provisioning(
                "empty",
                &["ProjectUnderTest/TestEmptyQualityProfile.xml"],
                vec![cs("EmptyProfileForTest")],
            )?,
            begin: BeginConfig::new(PROJECT_KEY)
                .name("empty")
                .version("1.0")
                .verbose(true),
            build: BuildRequest::rebuild(),
            end: EndConfig::default(),
            outcome: success(vec![Expectation::issue_count(0)]),
        },
    ))
}

fn help() -> Scenario {
    Scenario::help(
        "help",
        "The usage command succeeds and prints its banner",
        PROJECT_UNDER_TEST,
    )
    .requires(Precondition::LocalScannerBuild)
}
