//! Builtin example catalog.
//!
//! Examples are immutable, loaded at startup, and keyed by a stable
//! identifier. Each pairs a contract bundle (configuration text) with a
//! source text exercising it. The contract grammar is opaque data here; it is
//! handed verbatim to the guard library inside the runtime.

use serde::{Deserialize, Serialize};

/// One named example: a contract bundle plus code exercising it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Example {
    pub key: String,
    pub label: String,
    pub description: String,
    /// Configuration text (contract bundle definition).
    pub contract_yaml: String,
    /// Source text run against the bundle.
    pub source_code: String,
}

/// Keyed, ordered collection of examples.
#[derive(Debug, Clone)]
pub struct Catalog {
    examples: Vec<Example>,
}

impl Catalog {
    /// The three reference examples shipped with the playground.
    pub fn builtin() -> Self {
        Self {
            examples: vec![file_agent(), research_agent(), devops_agent()],
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.examples.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&Example> {
        self.examples.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    /// First example; the catalog is never empty.
    pub fn first(&self) -> &Example {
        &self.examples[0]
    }
}

fn file_agent() -> Example {
    Example {
        key: "file-agent".to_string(),
        label: "File Agent".to_string(),
        description: "Block sensitive file reads and destructive bash commands".to_string(),
        contract_yaml: r#"apiVersion: covenant/v1
kind: ContractBundle

metadata:
  name: file-agent
  description: "Contracts for file-handling agents. Blocks sensitive reads and destructive bash."

defaults:
  mode: enforce

contracts:
  - id: block-sensitive-reads
    type: pre
    tool: read_file
    when:
      args.path:
        contains_any: [".env", ".secret", "kubeconfig", "credentials", ".pem", "id_rsa"]
    then:
      effect: deny
      message: "Sensitive file '{args.path}' blocked."
      tags: [secrets, dlp]

  - id: block-destructive-bash
    type: pre
    tool: bash
    when:
      any:
        - args.command: { matches: '\\brm\\s+(-rf?|--recursive)\\b' }
        - args.command: { matches: '\\bmkfs\\b' }
        - args.command: { contains: '> /dev/' }
    then:
      effect: deny
      message: "Destructive command blocked: '{args.command}'."
      tags: [destructive, safety]

  - id: block-write-outside-target
    type: pre
    tool: write_file
    when:
      args.path:
        starts_with: /
    then:
      effect: deny
      message: "Write to absolute path '{args.path}' blocked. Use relative paths."
      tags: [write-scope]
"#
        .to_string(),
        source_code: r#"from covenant import Covenant, CovenantDenied

guard = Covenant.from_yaml("contracts.yaml")

async def read_file(path):
    return f"Contents of {path}"

# This will be DENIED - .env is a sensitive file
try:
    result = await guard.run(
        "read_file",
        {"path": "/app/.env"},
        read_file,
    )
except CovenantDenied as e:
    print(f"DENIED: {e.reason}")

# This will SUCCEED - safe file
result = await guard.run(
    "read_file",
    {"path": "README.md"},
    read_file,
)
print(f"OK: {result}")
"#
        .to_string(),
    }
}

fn research_agent() -> Example {
    Example {
        key: "research-agent".to_string(),
        label: "Research Agent".to_string(),
        description: "Session limits and PII detection for research workflows".to_string(),
        contract_yaml: r#"apiVersion: covenant/v1
kind: ContractBundle

metadata:
  name: research-agent
  description: "Contracts for research agents. Rate limits and output caps."

defaults:
  mode: enforce

contracts:
  - id: block-sensitive-reads
    type: pre
    tool: read_file
    when:
      args.path:
        contains_any: [".env", ".secret", "credentials"]
    then:
      effect: deny
      message: "Sensitive file '{args.path}' blocked."
      tags: [secrets]

  - id: pii-in-output
    type: post
    tool: "*"
    when:
      output.text:
        matches_any:
          - '\\b\\d{3}-\\d{2}-\\d{4}\\b'
    then:
      effect: warn
      message: "PII pattern detected in output. Redact before using."
      tags: [pii, compliance]

  - id: session-limits
    type: session
    limits:
      max_tool_calls: 50
      max_attempts: 100
    then:
      effect: deny
      message: "Session limit reached. Summarize progress and stop."
      tags: [rate-limit]
"#
        .to_string(),
        source_code: r#"from covenant import Covenant, CovenantDenied

guard = Covenant.from_yaml("contracts.yaml")

async def search(query):
    return f"Results for: {query}"

async def read_file(path):
    return f"Contents of {path}"

# This will be DENIED - credentials is sensitive
try:
    result = await guard.run(
        "read_file",
        {"path": "credentials.json"},
        read_file,
    )
except CovenantDenied as e:
    print(f"DENIED: {e.reason}")

# This will SUCCEED
result = await guard.run(
    "search",
    {"query": "python async patterns"},
    search,
)
print(f"OK: {result}")
"#
        .to_string(),
    }
}

fn devops_agent() -> Example {
    Example {
        key: "devops-agent".to_string(),
        label: "DevOps Agent".to_string(),
        description: "Production deploy gates, ticket requirements, and role checks".to_string(),
        contract_yaml: r#"apiVersion: covenant/v1
kind: ContractBundle

metadata:
  name: devops-agent
  description: "Contracts for DevOps agents. Prod gates, ticket requirements, PII detection."

defaults:
  mode: enforce

contracts:
  - id: block-sensitive-reads
    type: pre
    tool: read_file
    when:
      args.path:
        contains_any: [".env", ".secret", "kubeconfig", "credentials", ".pem", "id_rsa"]
    then:
      effect: deny
      message: "Sensitive file '{args.path}' blocked."
      tags: [secrets, dlp]

  - id: prod-deploy-requires-senior
    type: pre
    tool: deploy_service
    when:
      all:
        - environment: { equals: production }
        - principal.role: { not_in: [senior_engineer, sre, admin] }
    then:
      effect: deny
      message: "Production deploys require senior role (sre/admin)."
      tags: [change-control, production]

  - id: prod-requires-ticket
    type: pre
    tool: deploy_service
    when:
      all:
        - environment: { equals: production }
        - principal.ticket_ref: { exists: false }
    then:
      effect: deny
      message: "Production changes require a ticket reference."
      tags: [change-control, compliance]

  - id: pii-in-output
    type: post
    tool: "*"
    when:
      output.text:
        matches_any:
          - '\\b\\d{3}-\\d{2}-\\d{4}\\b'
    then:
      effect: warn
      message: "PII pattern detected in output. Redact before using."
      tags: [pii, compliance]

  - id: session-limits
    type: session
    limits:
      max_tool_calls: 20
      max_attempts: 50
    then:
      effect: deny
      message: "Session limit reached. Summarize progress and stop."
      tags: [rate-limit]
"#
        .to_string(),
        source_code: r#"from covenant import Covenant, CovenantDenied, Principal

guard = Covenant.from_yaml("contracts.yaml")

async def deploy_service(env, version):
    return f"Deployed v{version} to {env}"

# DENIED - junior role deploying to prod
try:
    result = await guard.run(
        "deploy_service",
        {"env": "production", "version": "2.1.0"},
        deploy_service,
        environment="production",
        principal=Principal(role="junior_engineer"),
    )
except CovenantDenied as e:
    print(f"DENIED: {e.reason}")

# DENIED - no ticket ref for prod
try:
    result = await guard.run(
        "deploy_service",
        {"env": "production", "version": "2.1.0"},
        deploy_service,
        environment="production",
        principal=Principal(role="sre"),
    )
except CovenantDenied as e:
    print(f"DENIED: {e.reason}")

# SUCCESS - senior role + ticket
result = await guard.run(
    "deploy_service",
    {"env": "production", "version": "2.1.0"},
    deploy_service,
    environment="production",
    principal=Principal(
        role="sre",
        ticket_ref="JIRA-1234",
    ),
)
print(f"OK: {result}")
"#
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_keys() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.keys(),
            vec!["file-agent", "research-agent", "devops-agent"]
        );
        assert_eq!(catalog.first().key, "file-agent");
    }

    #[test]
    fn test_examples_reference_the_contract_file() {
        let catalog = Catalog::builtin();
        for example in catalog.iter() {
            assert!(
                example.source_code.contains("contracts.yaml"),
                "{} must load the fixed contract file",
                example.key
            );
            assert!(!example.contract_yaml.is_empty());
            assert!(!example.description.is_empty());
        }
    }

    #[test]
    fn test_get_unknown_key_is_none() {
        assert!(Catalog::builtin().get("nope").is_none());
    }
}
