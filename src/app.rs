use anyhow::Context;
use anyhow::Result;

use crate::cli::Invocation;
use crate::cli::Options;
use crate::descriptor::TypeDescriptor;
use crate::entity::EntityKind;
use crate::provider::Provider;

pub struct App<P> {
    pub provider: P,
    pub descriptors: Vec<TypeDescriptor>,
}

impl<P: Provider> App<P> {
    pub fn new(provider: P, descriptors: Vec<TypeDescriptor>) -> Self {
        Self {
            provider,
            descriptors,
        }
    }

    pub fn descriptor(&self, kind: EntityKind) -> Result<&TypeDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.kind == kind)
            .with_context(|| format!("No descriptor for {}", kind))
    }

    /// Run a parsed command line.
    pub async fn run(
        &self,
        invocation: Invocation,
        options: &Options,
        stdout: &mut impl std::io::Write,
        stderr: &mut impl std::io::Write,
    ) -> Result<()> {
        match invocation {
            Invocation::List {
                kind,
                patterns,
                action,
            } => {
                self.cmd_list(kind, patterns, action.as_deref(), options, stdout, stderr)
                    .await
            }
            Invocation::Execute {
                kind,
                action,
                names,
            } => self.cmd_execute(kind, &action, &names, options, stdout).await,
        }
    }
}
