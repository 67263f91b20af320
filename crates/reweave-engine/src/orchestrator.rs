//! The modification state machine.
//!
//! One run per request: classify the scope, execute exactly one of the three
//! edit branches, write through the sandbox, refresh session state, report.
//! Per-file failures are recorded and never block sibling files; fatal
//! errors still flush whatever changes accumulated before them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reweave_markup::MarkupNode;
use reweave_oracle::DynOracle;
use reweave_sandbox::{find_composition_root, scan_project, PathSandbox};
use reweave_session::SessionStore;
use reweave_types::{
    snippet_of, ChangeKind, EntityKind, ModificationChange, ModificationResult,
    ModificationScope, ModificationStrategy, ProjectFile, ProjectFileMap, Result, ReweaveError,
    SessionContext,
};

use crate::classify::ScopeClassifier;
use crate::full_file::FullFileMutator;
use crate::mutator::{self, NodeMutator};
use crate::prompts;
use crate::selector::NodeSelector;
use crate::synthesizer::{Classification, ComponentSynthesizer};

// ---------------------------------------------------------------------------
// Configuration and phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one run; expiry tears down session bookkeeping
    /// but never rolls back writes already applied.
    pub timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// Lifecycle of one modification run. `ScopeClassified` resolves to exactly
/// one editing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScopeClassified,
    TargetedEditing,
    FullFileEditing,
    ComponentSynthesizing,
    WrittenToDisk,
    CacheUpdated,
    Reported,
}

// ---------------------------------------------------------------------------
// ModificationOrchestrator
// ---------------------------------------------------------------------------

pub struct ModificationOrchestrator {
    sandbox: Arc<PathSandbox>,
    sessions: Arc<SessionStore>,
    classifier: ScopeClassifier,
    selector: NodeSelector,
    mutator: NodeMutator,
    full_file: FullFileMutator,
    synthesizer: ComponentSynthesizer,
    config: OrchestratorConfig,
}

impl ModificationOrchestrator {
    pub fn new(
        oracle: Arc<DynOracle>,
        sandbox: Arc<PathSandbox>,
        sessions: Arc<SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sandbox,
            sessions,
            classifier: ScopeClassifier::new(Arc::clone(&oracle)),
            selector: NodeSelector::new(Arc::clone(&oracle)),
            mutator: NodeMutator::new(Arc::clone(&oracle)),
            full_file: FullFileMutator::new(Arc::clone(&oracle)),
            synthesizer: ComponentSynthesizer::new(oracle),
            config,
        }
    }

    /// Execute one modification request. Always yields a user-visible result
    /// carrying a reasoning string and the per-file change log; partial work
    /// is flushed even on fatal errors and on deadline expiry.
    pub async fn run(&self, session: &str, request: &str) -> ModificationResult {
        let mut changes: Vec<ModificationChange> = Vec::new();
        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.run_inner(session, request, &mut changes),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(session, error = %e, "modification run failed");
                if let Err(store_err) = self.sessions.record_changes(session, &changes).await {
                    tracing::warn!(session, error = %store_err, "failed to flush partial changes");
                }
                ModificationResult::failed(ModificationStrategy::TargetedNodes, e.to_string(), changes)
            }
            Err(_) => {
                let e = ReweaveError::DeadlineExceeded {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                };
                tracing::error!(session, error = %e, "tearing down session bookkeeping");
                self.sessions.cache().clear_session(session).await;
                if let Err(store_err) = self.sessions.record_changes(session, &changes).await {
                    tracing::warn!(session, error = %store_err, "failed to flush partial changes");
                }
                ModificationResult::failed(ModificationStrategy::TargetedNodes, e.to_string(), changes)
            }
        }
    }

    async fn run_inner(
        &self,
        session: &str,
        request: &str,
        changes: &mut Vec<ModificationChange>,
    ) -> Result<ModificationResult> {
        let mut phase = Phase::Idle;

        if !self.sandbox.root().is_dir() {
            return Err(ReweaveError::SessionSetup(format!(
                "working directory {} does not exist",
                self.sandbox.root().display()
            )));
        }

        let mut files = self.load_files(session).await?;
        if files.is_empty() {
            return Err(ReweaveError::SessionSetup(
                "no source files under the working directory".into(),
            ));
        }

        let scope = self.classifier.classify(request, &files).await;
        self.transition(&mut phase, Phase::ScopeClassified, session);

        match scope.strategy {
            ModificationStrategy::TargetedNodes => {
                self.transition(&mut phase, Phase::TargetedEditing, session);
                self.run_targeted(request, &scope, &mut files, changes).await?;
            }
            ModificationStrategy::FullFile => {
                self.transition(&mut phase, Phase::FullFileEditing, session);
                self.run_full_file(request, &scope, &mut files, changes).await?;
            }
            ModificationStrategy::ComponentAddition => {
                self.transition(&mut phase, Phase::ComponentSynthesizing, session);
                self.run_component(request, &scope, &mut files, changes).await?;
            }
        }
        self.transition(&mut phase, Phase::WrittenToDisk, session);

        self.refresh_session(session, &scope, &files, changes).await;
        self.transition(&mut phase, Phase::CacheUpdated, session);

        let result =
            ModificationResult::from_changes(scope.strategy, scope.reasoning, changes.clone());
        self.transition(&mut phase, Phase::Reported, session);
        tracing::info!(
            session,
            success = result.success,
            files = result.files_changed.len(),
            strategy = ?result.strategy_used,
            "modification run reported"
        );
        Ok(result)
    }

    /// Cache-aside snapshot load with a rescan fallback: cache miss falls to
    /// the durable store, and a missing or failing store falls to the tree
    /// itself.
    async fn load_files(&self, session: &str) -> Result<ProjectFileMap> {
        match self.sessions.snapshot(session).await {
            Ok(Some(map)) if !map.is_empty() => Ok(map),
            Ok(_) => scan_project(&self.sandbox).await,
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(session, error = %e, "snapshot load failed; rescanning tree");
                scan_project(&self.sandbox).await
            }
        }
    }

    async fn run_targeted(
        &self,
        request: &str,
        scope: &ModificationScope,
        files: &mut ProjectFileMap,
        changes: &mut Vec<ModificationChange>,
    ) -> Result<()> {
        for path in &scope.target_files {
            let Some(file) = files.get(path) else {
                continue;
            };
            let nodes = reweave_markup::index_project_file(file);
            let selection = self.selector.select(path, &nodes, request).await;
            if !selection.needs_change {
                tracing::debug!(path = %path, reason = %selection.reasoning, "file skipped");
                continue;
            }

            let selected: Vec<MarkupNode> = nodes
                .iter()
                .filter(|n| selection.selected_ids.contains(&n.id))
                .cloned()
                .collect();
            let replacements = match self.mutator.generate(path, &selected, request).await {
                Ok(replacements) => replacements,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    changes.push(
                        ModificationChange::new(ChangeKind::Modified, path, "targeted edit")
                            .failed(e.to_string()),
                    );
                    continue;
                }
            };
            if replacements.is_empty() {
                // No usable replacements is a no-op, not an error.
                tracing::debug!(path = %path, "no usable replacements; file unchanged");
                continue;
            }

            let new_content = mutator::apply(&nodes, &replacements, &file.content);
            if new_content == file.content {
                continue;
            }
            self.write_and_record(
                files,
                path,
                new_content,
                ChangeKind::Modified,
                selection.reasoning.clone(),
                changes,
            )
            .await;
        }
        Ok(())
    }

    async fn run_full_file(
        &self,
        request: &str,
        scope: &ModificationScope,
        files: &mut ProjectFileMap,
        changes: &mut Vec<ModificationChange>,
    ) -> Result<()> {
        let context = prompts::project_summary(files);
        for path in &scope.target_files {
            let Some(file) = files.get(path) else {
                continue;
            };
            let new_content = match self
                .full_file
                .regenerate(path, &file.content, request, &context)
                .await
            {
                Ok(content) => content,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    changes.push(
                        ModificationChange::new(ChangeKind::Modified, path, "file regeneration")
                            .failed(e.to_string()),
                    );
                    continue;
                }
            };
            if new_content == file.content {
                continue;
            }
            self.write_and_record(
                files,
                path,
                new_content,
                ChangeKind::Modified,
                format!("regenerated for: {request}"),
                changes,
            )
            .await;
        }
        Ok(())
    }

    async fn run_component(
        &self,
        request: &str,
        scope: &ModificationScope,
        files: &mut ProjectFileMap,
        changes: &mut Vec<ModificationChange>,
    ) -> Result<()> {
        let classification = match &scope.new_entity {
            Some(entity) => Classification {
                name: entity.name.clone(),
                kind: entity.kind,
                confidence: 1.0,
                reasoning: scope.reasoning.clone(),
            },
            None => self.synthesizer.classify(request).await,
        };

        let context = prompts::project_summary(files);
        let source = self
            .synthesizer
            .generate(request, &classification, &context)
            .await;

        let base = if files.keys().any(|k| k.starts_with("src/")) {
            "src/"
        } else {
            ""
        };
        let relative = format!(
            "{base}{}/{}.jsx",
            classification.kind.folder(),
            classification.name
        );

        match self.sandbox.write(&relative, &source).await {
            Ok(absolute) => {
                changes.push(ModificationChange::new(
                    ChangeKind::Created,
                    &relative,
                    format!("created {} {}", kind_word(classification.kind), classification.name),
                ));
                files.insert(
                    relative.clone(),
                    new_project_file(&absolute, &relative, &source, &classification.name),
                );
            }
            Err(e) => {
                changes.push(
                    ModificationChange::new(ChangeKind::Created, &relative, "new file")
                        .failed(e.to_string()),
                );
                return Ok(());
            }
        }

        if classification.kind == EntityKind::Page {
            self.wire_page(&classification, files, changes).await;
        }
        Ok(())
    }

    /// Route wiring after a page was created. Failure here leaves the run a
    /// partial success: the file exists, it is just not routed yet.
    async fn wire_page(
        &self,
        classification: &Classification,
        files: &mut ProjectFileMap,
        changes: &mut Vec<ModificationChange>,
    ) {
        let Some(root) = find_composition_root(files) else {
            changes.push(
                ModificationChange::new(ChangeKind::Updated, "", "route wiring")
                    .failed("no composition root found; page created but not routed"),
            );
            return;
        };
        let root_path = root.relative_path.clone();
        let root_content = root.content.clone();

        match self
            .synthesizer
            .wire_route(
                &root_path,
                &root_content,
                &classification.name,
                classification.kind.folder(),
            )
            .await
        {
            Ok((new_root, route)) => {
                self.write_and_record(
                    files,
                    &root_path,
                    new_root,
                    ChangeKind::Updated,
                    format!("wired {route} route for {}", classification.name),
                    changes,
                )
                .await;
            }
            Err(e) => {
                changes.push(
                    ModificationChange::new(ChangeKind::Updated, &root_path, "route wiring")
                        .failed(e.to_string()),
                );
            }
        }
    }

    /// Sandbox write plus in-memory mirror update. Failures become failed
    /// change entries; siblings keep going.
    async fn write_and_record(
        &self,
        files: &mut ProjectFileMap,
        path: &str,
        content: String,
        kind: ChangeKind,
        description: String,
        changes: &mut Vec<ModificationChange>,
    ) {
        match self.sandbox.write(path, &content).await {
            Ok(_) => {
                if let Some(file) = files.get_mut(path) {
                    file.update_content(content);
                }
                changes.push(ModificationChange::new(kind, path, description));
            }
            Err(e) => {
                changes.push(ModificationChange::new(kind, path, description).failed(e.to_string()));
            }
        }
    }

    /// Write-back of snapshot, change log, and touched context. Store
    /// failures degrade durability, not the already-computed result.
    async fn refresh_session(
        &self,
        session: &str,
        scope: &ModificationScope,
        files: &ProjectFileMap,
        changes: &[ModificationChange],
    ) {
        if let Err(e) = self.sessions.save_snapshot(session, files).await {
            tracing::warn!(session, error = %e, "snapshot write-back failed");
        }
        if let Err(e) = self.sessions.record_changes(session, changes).await {
            tracing::warn!(session, error = %e, "change log write-back failed");
        }
        let mut context = match self.sessions.context(session).await {
            Ok(Some(ctx)) => ctx,
            _ => SessionContext::new(session, self.sandbox.root()),
        };
        context.touch();
        context.last_summary = Some(scope.reasoning.clone());
        if let Err(e) = self.sessions.save_context(session, &context).await {
            tracing::warn!(session, error = %e, "context write-back failed");
        }
    }

    fn transition(&self, phase: &mut Phase, next: Phase, session: &str) {
        tracing::debug!(session, from = ?phase, to = ?next, "phase transition");
        *phase = next;
    }
}

fn kind_word(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Page => "page",
        EntityKind::Component => "component",
    }
}

fn new_project_file(absolute: &Path, relative: &str, content: &str, name: &str) -> ProjectFile {
    ProjectFile {
        name: relative.rsplit('/').next().unwrap_or(relative).to_string(),
        absolute_path: absolute.to_path_buf(),
        relative_path: relative.to_string(),
        line_count: content.lines().count(),
        size_bytes: content.len() as u64,
        snippet: snippet_of(content),
        component_name: name.to_string(),
        has_buttons: content.contains("<button") || content.contains("<Button"),
        has_signin: false,
        is_main_file: false,
        content: content.to_string(),
    }
}
