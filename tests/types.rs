// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests parsing, validation, and naming derived from the stack prefix.

use devstack::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.repository(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_with_registry_port() {
        let img = ImageRef::parse("localhost:5000/team/app:v1").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.repository(), "team/app");
        assert_eq!(img.tag(), Some("v1"));
    }

    #[test]
    fn org_is_not_a_registry() {
        let img = ImageRef::parse("bitnami/redis:7.2").unwrap();
        assert!(img.registry().is_none());
        assert_eq!(img.repository(), "bitnami/redis");
    }

    #[test]
    fn parse_with_digest_has_no_default_tag() {
        let img = ImageRef::parse("nginx@sha256:abc123").unwrap();
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert!(img.tag().is_none());
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(matches!(ImageRef::parse(""), Err(ParseImageRefError::Empty)));
        assert!(matches!(
            ImageRef::parse("nginx latest"),
            Err(ParseImageRefError::InvalidChar(' '))
        ));
        assert!(ImageRef::parse("nginx:").is_err());
        assert!(ImageRef::parse("nginx@").is_err());
    }

    #[test]
    fn default_registry_only_fills_a_missing_one() {
        let img = ImageRef::parse("postgres:16")
            .unwrap()
            .with_default_registry("mirror.example.com/");
        assert_eq!(img.to_string(), "mirror.example.com/postgres:16");

        let img = ImageRef::parse("ghcr.io/org/app:1")
            .unwrap()
            .with_default_registry("mirror.example.com");
        assert_eq!(img.to_string(), "ghcr.io/org/app:1");
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ServiceName::new("search-01").unwrap();
        assert_eq!(name.as_str(), "search-01");
        assert_eq!(name.as_alias().as_str(), "search-01");
    }

    #[test]
    fn invalid_names() {
        assert!(matches!(ServiceName::new(""), Err(ServiceNameError::Empty)));
        assert!(matches!(ServiceName::new("-db"), Err(ServiceNameError::EdgeHyphen)));
        assert!(matches!(ServiceName::new("db-"), Err(ServiceNameError::EdgeHyphen)));
        assert!(matches!(ServiceName::new("Db"), Err(ServiceNameError::NotLowercase)));
        assert!(matches!(ServiceName::new("d_b"), Err(ServiceNameError::InvalidChar('_'))));
        assert!(matches!(
            ServiceName::new(&"a".repeat(64)),
            Err(ServiceNameError::TooLong)
        ));
        assert!(ServiceName::new(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn names_order_alphabetically() {
        let mut names: Vec<ServiceName> = ["web", "cache", "db"]
            .iter()
            .map(|n| n.parse().unwrap())
            .collect();
        names.sort();
        let names: Vec<&str> = names.iter().map(ServiceName::as_str).collect();
        assert_eq!(names, ["cache", "db", "web"]);
    }
}

mod stack_prefix_tests {
    use super::*;

    #[test]
    fn derives_resource_names() {
        let prefix = StackPrefix::new("shop").unwrap();
        let db = ServiceName::new("db").unwrap();
        assert_eq!(prefix.container_name(&db), "shop-db");
        assert_eq!(prefix.network_name("network"), "shop-network");
    }

    #[test]
    fn invalid_prefixes() {
        assert!(matches!(StackPrefix::new("  "), Err(StackPrefixError::Empty)));
        assert!(matches!(StackPrefix::new("-shop"), Err(StackPrefixError::BadStart)));
        assert!(matches!(StackPrefix::new("my shop"), Err(StackPrefixError::InvalidChar(' '))));
        assert!(matches!(StackPrefix::new(&"x".repeat(41)), Err(StackPrefixError::TooLong)));
        assert!(StackPrefix::new("my_shop.v2").is_ok());
    }
}

mod network_alias_tests {
    use super::*;

    #[test]
    fn valid_alias() {
        assert_eq!(NetworkAlias::new(" db.local ").unwrap().as_str(), "db.local");
    }

    #[test]
    fn invalid_aliases() {
        assert!(matches!(NetworkAlias::new(""), Err(NetworkAliasError::Empty)));
        assert!(matches!(NetworkAlias::new("a/b"), Err(NetworkAliasError::InvalidChar('/'))));
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn container_id_shortens_like_docker_ps() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.as_str(), "0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }

    #[test]
    fn ids_compare_by_value() {
        assert_eq!(NetworkId::new("n1"), NetworkId::new("n1"));
        assert_ne!(NetworkId::new("n1"), NetworkId::new("n2"));
        assert_eq!(NetworkId::new("n1").to_string(), "n1");
    }
}
