use crate::error::{Error, Result};
use crate::fields;
use crate::models::{Identifier, NewProject, Project};
use crate::schema::{self, field};
use crate::session::Session;
use crate::store::doc_path;

pub struct ProjectService<'a> {
    session: &'a Session,
}

impl<'a> ProjectService<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Every project, ordered by name.
    pub async fn list(&self) -> Result<Vec<Project>> {
        let store = self.session.store()?;
        let docs = store.list(schema::PROJECTS).await?;
        let mut projects: Vec<Project> = docs
            .iter()
            .filter_map(|doc| match Project::from_document(doc) {
                Ok(project) => Some(project),
                Err(reason) => {
                    tracing::debug!(doc = %doc.id, %reason, "Skipping project");
                    None
                }
            })
            .collect();
        projects.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        tracing::info!(count = projects.len(), "Listed projects");
        Ok(projects)
    }

    pub async fn get(&self, project_id: &str) -> Result<Project> {
        let store = self.session.store()?;
        let doc = store
            .get(&doc_path(schema::PROJECTS, project_id))
            .await?
            .ok_or_else(|| Error::not_found(format!("project {project_id}")))?;
        Project::from_document(&doc)
            .map_err(|reason| Error::invalid(format!("project {project_id}: {reason}")))
    }

    pub async fn create(&self, new: &NewProject) -> Result<Project> {
        if new.name.trim().is_empty() {
            return Err(Error::invalid("project name must not be empty"));
        }
        let store = self.session.store()?;
        let key = store
            .add(schema::PROJECTS, new.to_fields(self.session.clock().now()))
            .await?;
        tracing::info!(id = %key, name = %new.name, "Created project");
        self.get(&key).await
    }

    pub async fn set_primary_account(&self, project_id: &str, account: &Identifier) -> Result<()> {
        let project = self.get(project_id).await?;
        let store = self.session.store()?;
        store
            .update(
                &doc_path(schema::PROJECTS, &project.id),
                fields! {
                    field::PRIMARY_ACCOUNT => account,
                    field::UPDATED_AT => self.session.clock().now(),
                },
            )
            .await?;
        tracing::info!(project_id, account = %account, "Set primary account");
        Ok(())
    }
}
