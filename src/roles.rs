//! Role catalog
//!
//! A role names the repository, packages, service and configuration files a
//! node needs to take on a part in the cluster. Profiles pick a role by name
//! and parameterize it.

use crate::profile::{NodeProfile, check_pattern};
use converge::ValidationError;

/// `zk://host:port[,host:port...]/path`
const ZK_ENDPOINT_PATTERN: &str = r"^zk://[^\s/,:]+:\d{1,5}(,[^\s/,:]+:\d{1,5})*/[^\s]+$";

/// Template for one node role
#[derive(Debug)]
pub struct RoleTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub repository: RepositoryTemplate,
    /// Container runtime, unless the profile overrides it
    pub runtime_package: &'static str,
    pub agent_package: &'static str,
    pub agent_service: &'static str,
    pub endpoint_pattern: &'static str,
    pub endpoint_file: &'static str,
    pub advertise_ip_file: &'static str,
    pub work_dir_file: &'static str,
    pub hostname_file: &'static str,
}

/// Package repository of a role; the suite comes from the profile
#[derive(Debug)]
pub struct RepositoryTemplate {
    pub name: &'static str,
    pub url: &'static str,
    pub components: &'static [&'static str],
    pub key_url: &'static str,
}

static ROLES: &[RoleTemplate] = &[RoleTemplate {
    name: "mesos-agent",
    description: "Mesos agent running Docker containers",
    repository: RepositoryTemplate {
        name: "mesosphere",
        url: "http://repos.mesosphere.com/ubuntu",
        components: &["main"],
        key_url: "https://keyserver.ubuntu.com/pks/lookup?op=get&search=0xDF7D54CBE56151BF",
    },
    runtime_package: "docker.io",
    agent_package: "mesos",
    agent_service: "mesos-slave",
    endpoint_pattern: ZK_ENDPOINT_PATTERN,
    endpoint_file: "/etc/mesos/zk",
    advertise_ip_file: "/etc/mesos-slave/advertise_ip",
    work_dir_file: "/etc/mesos-slave/work_dir",
    hostname_file: "/etc/mesos-slave/hostname",
}];

/// All known roles
pub fn all() -> &'static [RoleTemplate] {
    ROLES
}

/// Look up a role by name
pub fn find(name: &str) -> Option<&'static RoleTemplate> {
    ROLES.iter().find(|r| r.name == name)
}

/// Look up the profile's role and run its role-specific checks
pub fn resolve(profile: &NodeProfile) -> Result<&'static RoleTemplate, ValidationError> {
    let role = find(&profile.role).ok_or_else(|| ValidationError::InvalidField {
        field: "role".to_string(),
        message: format!(
            "unknown role '{}' (known: {})",
            profile.role,
            all().iter().map(|r| r.name).collect::<Vec<_>>().join(", ")
        ),
    })?;

    check_pattern("cluster_endpoint", &profile.cluster_endpoint, role.endpoint_pattern)?;

    if profile
        .disable_services
        .iter()
        .any(|name| name == role.agent_service)
    {
        return Err(ValidationError::InvalidField {
            field: "disable_services".to_string(),
            message: format!("{} is the agent service of role {}", role.agent_service, role.name),
        });
    }
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSource;

    fn profile(role: &str, endpoint: &str) -> NodeProfile {
        ProfileSource {
            role: Some(role.to_string()),
            cluster_endpoint: Some(endpoint.to_string()),
            advertised_address: Some("10.0.0.5".to_string()),
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_mesos_agent_is_known() {
        let role = find("mesos-agent").unwrap();
        assert_eq!(role.agent_service, "mesos-slave");
        assert_eq!(role.repository.name, "mesosphere");
        assert!(find("mesos-master").is_none());
    }

    #[test]
    fn test_zk_endpoints() {
        for ok in [
            "zk://10.0.0.1:2181/mesos",
            "zk://zk1.internal:2181,zk2.internal:2181,zk3.internal:2181/mesos",
        ] {
            assert!(resolve(&profile("mesos-agent", ok)).is_ok(), "{ok}");
        }

        for bad in [
            "10.0.0.1:2181",
            "zk://10.0.0.1/mesos",
            "zk://10.0.0.1:2181",
            "http://10.0.0.1:2181/mesos",
        ] {
            assert!(
                matches!(
                    resolve(&profile("mesos-agent", bad)),
                    Err(ValidationError::InvalidField { field, .. }) if field == "cluster_endpoint"
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_disabling_agent_service_is_rejected() {
        let mut profile = profile("mesos-agent", "zk://10.0.0.1:2181/mesos");
        profile.disable_services = vec!["zookeeper".to_string(), "mesos-slave".to_string()];

        assert!(matches!(
            resolve(&profile),
            Err(ValidationError::InvalidField { field, .. }) if field == "disable_services"
        ));
    }

    #[test]
    fn test_unknown_role() {
        let err = resolve(&profile("web-frontend", "zk://a:1/b")).unwrap_err();
        assert!(err.to_string().contains("unknown role 'web-frontend'"));
        assert!(err.to_string().contains("mesos-agent"));
    }
}
