use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use futures_util::StreamExt as _;
use log::debug;

use crate::App;
use crate::cli::Options;
use crate::descriptor::Action;
use crate::descriptor::InstanceOp;
use crate::entity::Entity;
use crate::entity::EntityKind;
use crate::format::write_entity;
use crate::pattern;
use crate::provider::Provider;

impl InstanceOp {
    /// Whether the action itself applies the defined properties.
    fn consumes_properties(self) -> bool {
        matches!(self, Self::Update | Self::AddHook)
    }
}

impl<P: Provider> App<P> {
    /// List the entities of `kind` matching `patterns`, acting on each one.
    ///
    /// Entities are handled strictly one after another in provider order:
    /// 1. Run the selected instance action, if any.
    /// 2. With properties defined, assign them and update the entity, unless the
    ///    action already consumed them. Nothing is printed for the entity.
    /// 3. Otherwise print the entity, or collect it for the final JSON array.
    pub async fn cmd_list(
        &self,
        kind: EntityKind,
        patterns: Vec<String>,
        action: Option<&str>,
        options: &Options,
        stdout: &mut impl std::io::Write,
        stderr: &mut impl std::io::Write,
    ) -> Result<()> {
        let descriptor = self.descriptor(kind)?;
        let op = match action {
            Some(name) => match descriptor.action(name) {
                Some(action @ Action::Instance { op, .. }) => {
                    debug!("{} {}: {}", descriptor.name, name, action.description());
                    Some(*op)
                }
                _ => bail!("{} has no action {}", descriptor.name, name),
            },
            None => None,
        };
        ensure!(
            op != Some(InstanceOp::Delete) || options.properties.is_empty(),
            "Definitions cannot be applied to deleted {}",
            descriptor.collection_name
        );
        let attributes = options
            .attributes
            .as_ref()
            .unwrap_or(&descriptor.attributes);
        let patterns = pattern::normalize(patterns);
        debug!(
            "Listing {} matching {}",
            descriptor.collection_name,
            patterns.join(" ")
        );

        let mut json = Vec::new();
        let mut entities = self.provider.collection(kind, patterns);
        while let Some(entity) = entities.next().await {
            let mut entity = entity?;

            if let Some(op) = op {
                self.run_instance_action(op, &mut entity, options).await?;
            }

            if !options.properties.is_empty() {
                if !op.is_some_and(InstanceOp::consumes_properties) {
                    entity.assign(&options.properties)?;
                    self.provider.update(&entity).await?;
                }
                continue;
            }

            if options.json {
                json.push(entity.projection(attributes));
            } else {
                write_entity(stdout, &entity, attributes, options)?;
            }
        }

        if options.json {
            writeln!(stdout, "{}", serde_json::to_string(&json)?)?;
        }

        if options.statistics {
            if let Some(statistics) = self.provider.statistics() {
                writeln!(stderr, "{}", statistics)?;
            }
        }

        Ok(())
    }

    async fn run_instance_action(
        &self,
        op: InstanceOp,
        entity: &mut Entity,
        options: &Options,
    ) -> Result<()> {
        debug!("Running {:?} on {}", op, entity.full_name());
        match op {
            InstanceOp::Update => {
                entity.assign(&options.properties)?;
                self.provider.update(entity).await
            }
            InstanceOp::Delete => self.provider.delete(entity).await,
            InstanceOp::Merge => self.provider.merge(entity).await,
            InstanceOp::Decline => self.provider.decline(entity).await,
            InstanceOp::AddHook => {
                let url = options
                    .action_options
                    .get("url")
                    .context("A hook url is required (--url)")?;
                self.provider
                    .add_hook(entity, url, &options.properties)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::App;
    use crate::cli::Options;
    use crate::descriptor::descriptors;
    use crate::entity::AttributeValue;
    use crate::entity::Entity;
    use crate::entity::EntityKind;
    use crate::entity::Properties;
    use crate::provider::testing::RecordingProvider;

    fn repositories() -> Vec<Entity> {
        vec![
            Entity::new(EntityKind::Repository, "a/1"),
            Entity::new(EntityKind::Repository, "a/2"),
        ]
    }

    fn pull_requests() -> Vec<Entity> {
        vec![
            Entity::new(EntityKind::PullRequest, "a/1#1").with("title", "first"),
            Entity::new(EntityKind::PullRequest, "a/1#2").with("title", "second"),
        ]
    }

    fn properties(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn list(
        app: &App<RecordingProvider>,
        kind: EntityKind,
        patterns: &[&str],
        action: Option<&str>,
        options: &Options,
    ) -> anyhow::Result<(String, String)> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        app.cmd_list(
            kind,
            patterns.iter().map(|p| p.to_string()).collect(),
            action,
            options,
            &mut stdout,
            &mut stderr,
        )
        .await?;
        Ok((String::from_utf8(stdout)?, String::from_utf8(stderr)?))
    }

    #[tokio::test]
    async fn test_no_patterns_requests_everything() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        list(&app, EntityKind::Repository, &[], None, &Options::default())
            .await
            .unwrap();
        assert_eq!(app.provider.calls(), vec!["repositories *"]);
    }

    #[tokio::test]
    async fn test_patterns_passed_through() {
        let app = App::new(RecordingProvider::new(vec![]), descriptors());
        list(
            &app,
            EntityKind::Branch,
            &["a/*", "b/c#main"],
            None,
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(app.provider.calls(), vec!["branches a/*,b/c#main"]);
    }

    #[tokio::test]
    async fn test_json_output() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let options = Options {
            json: true,
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::Repository, &[], None, &options)
            .await
            .unwrap();
        assert_eq!(stdout, "[{\"fullName\":\"a/1\"},{\"fullName\":\"a/2\"}]\n");
    }

    #[tokio::test]
    async fn test_json_has_one_element_per_entity() {
        let entities = (0..5)
            .map(|i| {
                Entity::new(EntityKind::Repository, format!("a/{}", i))
                    .with("description", format!("repository {}", i))
                    .with("topics", vec!["x".to_string(), "y".to_string()])
            })
            .collect();
        let app = App::new(RecordingProvider::new(entities), descriptors());
        let options = Options {
            json: true,
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::Repository, &[], None, &options)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 5);
        assert_eq!(array[3]["description"], "repository 3");
        assert_eq!(array[3]["topics"], serde_json::json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_text_output() {
        let entities = vec![
            Entity::new(EntityKind::Repository, "a/1")
                .with("description", "first")
                .with("topics", vec!["infra".to_string(), "rust".to_string()]),
        ];
        let app = App::new(RecordingProvider::new(entities), descriptors());
        let options = Options {
            attributes: Some(vec!["description".to_string(), "topics".to_string()]),
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::Repository, &[], None, &options)
            .await
            .unwrap();
        insta::assert_snapshot!(stdout, @r"
        a/1:
          description: first
               topics: infra rust
        ");
    }

    #[tokio::test]
    async fn test_listing_is_repeatable() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let options = Options::default();
        let first = list(&app, EntityKind::Repository, &["a/*"], None, &options)
            .await
            .unwrap();
        let second = list(&app, EntityKind::Repository, &["a/*"], None, &options)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            app.provider.calls(),
            vec!["repositories a/*", "repositories a/*"]
        );
    }

    #[tokio::test]
    async fn test_defines_update_every_entity() {
        let provider = RecordingProvider::new(repositories()).observing("topic");
        let app = App::new(provider, descriptors());
        let options = Options {
            properties: properties(&[("topic", "infra")]),
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::Repository, &[], None, &options)
            .await
            .unwrap();

        assert_eq!(stdout, "");
        assert_eq!(
            app.provider.calls(),
            vec!["repositories *", "update a/1", "update a/2"]
        );
        let infra = Some(AttributeValue::String("infra".to_string()));
        assert_eq!(
            *app.provider.observed.borrow(),
            vec![
                ("a/1".to_string(), "topic".to_string(), infra.clone()),
                ("a/2".to_string(), "topic".to_string(), infra),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_action_updates_once() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let options = Options {
            properties: properties(&[("description", "x")]),
            ..Options::default()
        };
        list(&app, EntityKind::Repository, &[], Some("update"), &options)
            .await
            .unwrap();
        assert_eq!(
            app.provider.calls(),
            vec!["repositories *", "update a/1", "update a/2"]
        );
    }

    #[tokio::test]
    async fn test_action_runs_before_update() {
        let app = App::new(RecordingProvider::new(pull_requests()), descriptors());
        let options = Options {
            properties: properties(&[("title", "renamed")]),
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::PullRequest, &[], Some("merge"), &options)
            .await
            .unwrap();
        assert_eq!(stdout, "");
        assert_eq!(
            app.provider.calls(),
            vec![
                "pullRequests *",
                "merge a/1#1",
                "update a/1#1",
                "merge a/1#2",
                "update a/1#2"
            ]
        );
    }

    #[tokio::test]
    async fn test_action_without_defines_still_lists() {
        let app = App::new(RecordingProvider::new(pull_requests()), descriptors());
        let options = Options {
            identifier: false,
            attributes: Some(vec!["title".to_string()]),
            ..Options::default()
        };
        let (stdout, _) = list(&app, EntityKind::PullRequest, &[], Some("decline"), &options)
            .await
            .unwrap();
        assert_eq!(stdout, "first\nsecond\n");
        assert_eq!(
            app.provider.calls(),
            vec!["pullRequests *", "decline a/1#1", "decline a/1#2"]
        );
    }

    #[tokio::test]
    async fn test_add_hook_consumes_defines() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let mut options = Options {
            properties: properties(&[("events", "push")]),
            ..Options::default()
        };
        options
            .action_options
            .insert("url".to_string(), "https://example.com".to_string());
        list(&app, EntityKind::Repository, &["a/1"], Some("add-hook"), &options)
            .await
            .unwrap();
        assert_eq!(
            app.provider.calls(),
            vec![
                "repositories a/1",
                "add_hook a/1 https://example.com",
                "add_hook a/2 https://example.com"
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_rejects_defines() {
        let hooks = vec![Entity::new(EntityKind::Hook, "a/r#4")];
        let app = App::new(RecordingProvider::new(hooks), descriptors());
        let options = Options {
            properties: properties(&[("active", "false")]),
            ..Options::default()
        };
        let result = list(&app, EntityKind::Hook, &["a/r#4"], Some("delete"), &options).await;
        assert!(result.is_err());
        assert!(app.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_defines() {
        let hooks = vec![Entity::new(EntityKind::Hook, "a/r#4")];
        let app = App::new(RecordingProvider::new(hooks), descriptors());
        list(&app, EntityKind::Hook, &["a/r#4"], Some("delete"), &Options::default())
            .await
            .unwrap();
        assert_eq!(app.provider.calls(), vec!["hooks a/r#4", "delete a/r#4"]);
    }

    #[tokio::test]
    async fn test_add_hook_requires_url() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let result = list(
            &app,
            EntityKind::Repository,
            &[],
            Some("add-hook"),
            &Options::default(),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("--url"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let app = App::new(RecordingProvider::new(repositories()), descriptors());
        let result = list(
            &app,
            EntityKind::Repository,
            &[],
            Some("merge"),
            &Options::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(app.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_iteration() {
        let provider = RecordingProvider::new(pull_requests()).failing_on("merge a/1#1");
        let app = App::new(provider, descriptors());
        let result = list(
            &app,
            EntityKind::PullRequest,
            &[],
            Some("merge"),
            &Options::default(),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("merge a/1#1"));
        assert_eq!(app.provider.calls(), vec!["pullRequests *", "merge a/1#1"]);
    }

    #[tokio::test]
    async fn test_statistics_to_stderr() {
        let provider = RecordingProvider::new(repositories()).with_statistics("hits: 3");
        let app = App::new(provider, descriptors());
        let options = Options {
            statistics: true,
            json: true,
            ..Options::default()
        };
        let (_, stderr) = list(&app, EntityKind::Repository, &[], None, &options)
            .await
            .unwrap();
        assert_eq!(stderr, "hits: 3\n");

        let (_, stderr) = list(&app, EntityKind::Repository, &[], None, &Options::default())
            .await
            .unwrap();
        assert_eq!(stderr, "");
    }
}
