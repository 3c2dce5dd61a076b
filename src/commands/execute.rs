use anyhow::Result;
use anyhow::bail;
use log::debug;

use crate::App;
use crate::cli::Options;
use crate::descriptor::Action;
use crate::descriptor::CollectionOp;
use crate::entity::EntityKind;
use crate::provider::Provider;

impl<P: Provider> App<P> {
    /// Run a collection action once per name, in order.
    pub async fn cmd_execute(
        &self,
        kind: EntityKind,
        action: &str,
        names: &[String],
        options: &Options,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let descriptor = self.descriptor(kind)?;
        let Some(Action::Collection { op, .. }) = descriptor.action(action) else {
            bail!("{} has no action {}", descriptor.name, action);
        };

        for name in names {
            debug!("Running {:?} for {}", op, name);
            match op {
                CollectionOp::CreateRepository => {
                    self.provider
                        .create_repository(name, &options.properties)
                        .await?;
                    writeln!(stdout, "Created repository: {}", name)?;
                }
                CollectionOp::CreatePullRequest => {
                    self.provider
                        .create_pull_request(name, &options.properties)
                        .await?;
                    writeln!(stdout, "Created pull request from: {}", name)?;
                }
            }
        }

        Ok(())
    }
}
