use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{Modality, ModalitySelection, ProcessingLevel, SessionIdentity, StorageKind};
use crate::error::BndError;
use crate::inspect::{
    BehaviorInspector, EphysInspector, InspectPolicy, ModalityInspector, ValidationViolation,
    VideoInspector,
};
use crate::paths::{PathResolver, SessionPath};
use crate::schema::SCHEMA_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub session: SessionIdentity,
    pub schema_version: u32,
    /// Only modalities that were in scope appear here.
    pub per_modality: BTreeMap<Modality, Vec<ValidationViolation>>,
    pub overall: Verdict,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.overall == Verdict::Valid
    }

    /// First violation in modality order.
    pub fn first_violation(&self) -> Option<&ValidationViolation> {
        self.per_modality.values().flat_map(|list| list.iter()).next()
    }

    pub fn violations(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.per_modality.values().flat_map(|list| list.iter())
    }

    pub fn into_error(self) -> BndError {
        let detail = self
            .first_violation()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no violations".to_string());
        BndError::ValidationFailed {
            session: self.session.session_name(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectValidation {
    pub subject: String,
    pub reports: Vec<ValidationReport>,
    /// Folder names in the subject directory that are not sessions of this subject.
    pub invalid_names: Vec<String>,
}

pub struct SessionValidator {
    inspectors: Vec<Box<dyn ModalityInspector>>,
    policy: InspectPolicy,
}

impl SessionValidator {
    pub fn new(config: &ResolvedConfig, policy: InspectPolicy) -> Self {
        Self::with_inspectors(
            vec![
                Box::new(BehaviorInspector),
                Box::new(EphysInspector::new(
                    config.extensions_to_rename_and_upload.clone(),
                )),
                Box::new(VideoInspector::new(config.expected_cameras)),
            ],
            policy,
        )
    }

    pub fn with_inspectors(inspectors: Vec<Box<dyn ModalityInspector>>, policy: InspectPolicy) -> Self {
        Self { inspectors, policy }
    }

    pub fn policy(&self) -> InspectPolicy {
        self.policy
    }

    pub fn validate_session(
        &self,
        session: &SessionPath,
        include: &ModalitySelection,
    ) -> Result<ValidationReport, BndError> {
        if session.level() != ProcessingLevel::Raw {
            return Err(BndError::UnsupportedProcessingLevel(
                session.level().to_string(),
            ));
        }
        let mut per_modality = BTreeMap::new();
        for inspector in &self.inspectors {
            let modality = inspector.modality();
            if !include.contains(modality) {
                continue;
            }
            let violations = inspector.inspect(session, self.policy)?;
            tracing::debug!(
                session = %session.name(),
                %modality,
                violations = violations.len(),
                "inspected"
            );
            per_modality.insert(modality, violations);
        }
        let overall = if per_modality.values().all(Vec::is_empty) {
            Verdict::Valid
        } else {
            Verdict::Invalid
        };
        tracing::info!(session = %session.name(), ?overall, "validated session");
        Ok(ValidationReport {
            session: session.identity().clone(),
            schema_version: SCHEMA_VERSION,
            per_modality,
            overall,
        })
    }

    /// Validates every local session of `subject`; one invalid session never hides the rest.
    pub fn validate_sessions(
        &self,
        resolver: &PathResolver,
        subject: &str,
        include: &ModalitySelection,
    ) -> Result<SubjectValidation, BndError> {
        let sessions = resolver.list_subject_sessions(StorageKind::Local, subject)?;
        let mut reports = Vec::with_capacity(sessions.valid.len());
        for session in &sessions.valid {
            reports.push(self.validate_session(session, include)?);
        }
        Ok(SubjectValidation {
            subject: subject.to_string(),
            reports,
            invalid_names: sessions.invalid,
        })
    }
}
