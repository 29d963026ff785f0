//! Core data structures for the blocking engine.
//!
//! This module defines elements, dependency edges, the closed enums that
//! classify them, and the records the blocked cache is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::gate::Gate;
use crate::{Error, Result};

/// Element represents a trackable item (task, plan, ...) in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    // ===== Core Identification =====
    pub id: String,

    #[serde(rename = "type")]
    pub element_type: ElementType,

    // ===== Status & Scheduling =====
    pub status: ElementStatus,

    /// Only meaningful for tasks; other element types leave it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,

    // ===== Timestamps =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Element {
    /// Create an open element with no scheduling values.
    pub fn new(id: impl Into<String>, element_type: ElementType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            element_type,
            status: ElementStatus::Open,
            priority: None,
            complexity: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Create an open task with medium priority and complexity.
    pub fn task(id: impl Into<String>) -> Self {
        let mut element = Self::new(id, ElementType::Task);
        element.priority = Some(Priority::default());
        element.complexity = Some(Complexity::default());
        element
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when this element no longer holds anything up: closed,
    /// completed, tombstoned or soft-deleted.
    pub fn is_completed_for_blocking(&self) -> bool {
        self.is_deleted() || self.status.is_completed()
    }

    /// True when the element participates in the blocked cache at all.
    /// Soft-deleted and tombstoned elements never carry an entry.
    pub fn is_cache_candidate(&self) -> bool {
        !self.is_deleted() && self.status != ElementStatus::Tombstone
    }

    pub fn priority_or_default(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    pub fn complexity_or_default(&self) -> Complexity {
        self.complexity.unwrap_or_default()
    }

    /// Validate checks if the Element has valid field values.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::SchemaValidation("id is required".to_string()));
        }
        if self.id.len() > 255 {
            return Err(Error::SchemaValidation(format!(
                "id must be 255 characters or less (got {})",
                self.id.len()
            )));
        }
        Ok(())
    }
}

/// Status represents the lifecycle state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Completed,
    Cancelled,
    Tombstone,
}

impl ElementStatus {
    /// Closed, completed and tombstoned elements stop blocking others.
    /// Cancelled work does not count as done.
    pub fn is_completed(&self) -> bool {
        match self {
            ElementStatus::Closed | ElementStatus::Completed | ElementStatus::Tombstone => true,
            ElementStatus::Open
            | ElementStatus::InProgress
            | ElementStatus::Blocked
            | ElementStatus::Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementStatus::Open => "open",
            ElementStatus::InProgress => "in_progress",
            ElementStatus::Blocked => "blocked",
            ElementStatus::Closed => "closed",
            ElementStatus::Completed => "completed",
            ElementStatus::Cancelled => "cancelled",
            ElementStatus::Tombstone => "tombstone",
        }
    }
}

impl fmt::Display for ElementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ElementStatus::Open),
            "in_progress" | "in-progress" => Ok(ElementStatus::InProgress),
            "blocked" => Ok(ElementStatus::Blocked),
            "closed" => Ok(ElementStatus::Closed),
            "completed" => Ok(ElementStatus::Completed),
            "cancelled" | "canceled" => Ok(ElementStatus::Cancelled),
            "tombstone" => Ok(ElementStatus::Tombstone),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// ElementType categorizes what an element is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Task,
    Plan,
    Workflow,
    Playbook,
    Document,
    Library,
    Entity,
    Team,
    Channel,
    Message,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Task => "task",
            ElementType::Plan => "plan",
            ElementType::Workflow => "workflow",
            ElementType::Playbook => "playbook",
            ElementType::Document => "document",
            ElementType::Library => "library",
            ElementType::Entity => "entity",
            ElementType::Team => "team",
            ElementType::Channel => "channel",
            ElementType::Message => "message",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "task" => Ok(ElementType::Task),
            "plan" => Ok(ElementType::Plan),
            "workflow" => Ok(ElementType::Workflow),
            "playbook" => Ok(ElementType::Playbook),
            "document" => Ok(ElementType::Document),
            "library" => Ok(ElementType::Library),
            "entity" => Ok(ElementType::Entity),
            "team" => Ok(ElementType::Team),
            "channel" => Ok(ElementType::Channel),
            "message" => Ok(ElementType::Message),
            _ => Err(Error::InvalidElementType(s.to_string())),
        }
    }
}

/// Priority levels for tasks. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Critical priority (1)
    Critical = 1,
    /// High priority (2)
    High = 2,
    /// Medium priority (3)
    Medium = 3,
    /// Low priority (4)
    Low = 4,
    /// Minimal priority (5)
    Minimal = 5,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Priority::Critical),
            2 => Some(Priority::High),
            3 => Some(Priority::Medium),
            4 => Some(Priority::Low),
            5 => Some(Priority::Minimal),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Minimal => "minimal",
        };
        write!(f, "P{} ({})", self.as_i64(), s)
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" | "1" => Ok(Priority::Critical),
            "high" | "2" => Ok(Priority::High),
            "medium" | "3" => Ok(Priority::Medium),
            "low" | "4" => Ok(Priority::Low),
            "minimal" | "5" => Ok(Priority::Minimal),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

/// Complexity bands for effort estimates. Higher values mean more work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial = 1,
    Simple = 2,
    Medium = 3,
    Complex = 4,
    VeryComplex = 5,
}

impl Default for Complexity {
    fn default() -> Self {
        Complexity::Medium
    }
}

impl Complexity {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn points(&self) -> u32 {
        *self as u32
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Complexity::Trivial),
            2 => Some(Complexity::Simple),
            3 => Some(Complexity::Medium),
            4 => Some(Complexity::Complex),
            5 => Some(Complexity::VeryComplex),
            _ => None,
        }
    }
}

impl FromStr for Complexity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trivial" | "1" => Ok(Complexity::Trivial),
            "simple" | "2" => Ok(Complexity::Simple),
            "medium" | "3" => Ok(Complexity::Medium),
            "complex" | "4" => Ok(Complexity::Complex),
            "very_complex" | "very-complex" | "5" => Ok(Complexity::VeryComplex),
            _ => Err(Error::InvalidComplexity(s.to_string())),
        }
    }
}

/// Dependency represents a directed edge from `source_id` to `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    /// Gate metadata; only present on `awaits` edges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Dependency {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: DependencyKind,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            gate: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    /// Create an `awaits` edge guarded by `gate`.
    pub fn awaits(source_id: impl Into<String>, target_id: impl Into<String>, gate: Gate) -> Self {
        let mut dep = Self::new(source_id, target_id, DependencyKind::Awaits);
        dep.gate = Some(gate);
        dep
    }

    /// Validate checks if the Dependency has valid field values
    pub fn validate(&self) -> Result<()> {
        if self.source_id.is_empty() {
            return Err(Error::SchemaValidation("source is required".to_string()));
        }
        if self.target_id.is_empty() {
            return Err(Error::SchemaValidation("target is required".to_string()));
        }
        if self.source_id == self.target_id {
            return Err(Error::SchemaValidation(format!(
                "element {} cannot depend on itself",
                self.source_id
            )));
        }
        match (&self.kind, &self.gate) {
            (DependencyKind::Awaits, None) => Err(Error::SchemaValidation(
                "awaits dependency requires a gate".to_string(),
            )),
            (DependencyKind::Awaits, Some(gate)) => gate.validate(),
            (kind, Some(_)) => Err(Error::SchemaValidation(format!(
                "{} dependency cannot carry a gate",
                kind
            ))),
            (_, None) => Ok(()),
        }
    }
}

/// DependencyKind categorizes the relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    // Workflow kinds (affect blocking)
    Blocks,
    ParentChild,
    Awaits,

    // Informational kinds
    RelatesTo,
    References,
}

impl DependencyKind {
    pub const BLOCKING: [DependencyKind; 3] = [
        DependencyKind::Blocks,
        DependencyKind::ParentChild,
        DependencyKind::Awaits,
    ];

    /// True if this kind can make its source blocked.
    pub fn is_blocking(&self) -> bool {
        match self {
            DependencyKind::Blocks | DependencyKind::ParentChild | DependencyKind::Awaits => true,
            DependencyKind::RelatesTo | DependencyKind::References => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
            DependencyKind::ParentChild => "parent-child",
            DependencyKind::Awaits => "awaits",
            DependencyKind::RelatesTo => "relates-to",
            DependencyKind::References => "references",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "blocks" => Ok(DependencyKind::Blocks),
            "parent-child" => Ok(DependencyKind::ParentChild),
            "awaits" => Ok(DependencyKind::Awaits),
            "relates-to" => Ok(DependencyKind::RelatesTo),
            "references" => Ok(DependencyKind::References),
            _ => Err(Error::InvalidDependencyKind(s.to_string())),
        }
    }
}

/// Verdict of the blocking evaluator for a single element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedInfo {
    pub blocked_by: String,
    pub reason: String,
}

/// One row of the blocked cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub element_id: String,
    pub blocked_by: String,
    pub reason: String,
}

impl BlockedEntry {
    pub fn new(
        element_id: impl Into<String>,
        blocked_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            blocked_by: blocked_by.into(),
            reason: reason.into(),
        }
    }

    pub fn from_info(element_id: impl Into<String>, info: BlockedInfo) -> Self {
        Self {
            element_id: element_id.into(),
            blocked_by: info.blocked_by,
            reason: info.reason,
        }
    }
}

/// Summary of a full cache rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub elements_checked: usize,
    pub elements_blocked: usize,
    pub duration_ms: u64,
}
