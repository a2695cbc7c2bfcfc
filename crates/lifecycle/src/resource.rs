//! Resource state machine
//!
//! A [`Resource`] owns one persisted [`ResourceRecord`] and drives it through
//! the lifecycle actions. Every action follows the same shape:
//!
//! 1. guard: the current (action, status) must permit the action
//! 2. (ACTION, IN_PROGRESS) is persisted
//! 3. properties are validated (create, update, adopt)
//! 4. the handler runs, under retry for create and delete
//! 5. (ACTION, COMPLETE) is persisted, or (ACTION, FAILED) with the reason
//!
//! Guard violations never touch the record. Every transition and failure is
//! reported to the engine's [`EventSink`](crate::context::EventSink).

use crate::context::{Event, HandlerContext};
use crate::diff::{Reconciliation, ResourceChange, TemplateDiff, diff_properties, diff_template};
use crate::engine::Engine;
use crate::error::{Error, ResourceFailure, Result};
use crate::executor::{self, HandlerCall};
use crate::handler::Operation;
use crate::hooks::{self, Breakpoints, Hook};
use crate::naming;
use crate::registry::ResourceType;
use crate::retry::{Phase, RetryTarget, run_with_retry};
use crate::schema;
use crate::types::{
    AbandonData, Action, AdoptData, PropertyMap, ResourceData, ResourceDefinition, ResourceRecord,
    StackContext, State, Status, UpdateOutcome, UpdateReplace,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const STATE_CHANGED: &str = "state changed";

/// Outcome of reconciling a new definition against the current one
enum UpdatePlan {
    Unchanged,
    Replace,
    InPlace {
        properties: PropertyMap,
        template_diff: TemplateDiff,
        property_diff: PropertyMap,
    },
}

/// One resource instance within a stack
pub struct Resource {
    record: ResourceRecord,
    definition: ResourceDefinition,
    stack: StackContext,
    resource_type: Arc<ResourceType>,
    engine: Engine,
    breakpoints: Breakpoints,
}

// ============================================================================
// Construction
// ============================================================================

impl Resource {
    /// Build a resource from its (resolved) definition.
    ///
    /// When the stack is stored, the latest record for this name is loaded
    /// so the resource continues from its persisted state.
    pub async fn new(definition: ResourceDefinition, stack: StackContext, engine: Engine) -> Result<Self> {
        if definition.name.contains('/') {
            return Err(Error::StackValidation {
                message: "Resource name may not contain \"/\"".to_string(),
            });
        }
        if definition.resource_type.is_empty() {
            return Err(Error::InvalidResourceType {
                name: definition.name.clone(),
            });
        }
        let resource_type = engine.registry.get_class(&definition.resource_type)?;

        let existing = match &stack.id {
            Some(stack_id) => {
                engine
                    .store
                    .get_by_name_and_stack(&definition.name, stack_id)
                    .await?
            }
            None => None,
        };

        let record = match existing {
            Some(record) => {
                log::debug!("Loaded record {:?} for {}", record.id, definition.name);
                record
            }
            None => {
                let mut record = ResourceRecord::new(
                    &definition.name,
                    &definition.resource_type,
                    stack.id.as_deref(),
                );
                record.metadata = definition.metadata.clone();
                if stack.state == State::new(Action::Delete, Status::InProgress) {
                    record.action = Action::Delete;
                }
                record
            }
        };

        Ok(Self {
            record,
            definition,
            stack,
            resource_type,
            engine,
            breakpoints: Breakpoints::none(),
        })
    }

    /// Rebuild a resource from a stored record. The definition is
    /// reconstructed from the last applied properties and stored metadata.
    pub async fn load(id: i64, stack: StackContext, engine: Engine) -> Result<Self> {
        let record = engine.store.get(id).await?;
        let resource_type = engine.registry.get_class(&record.resource_type)?;
        let definition = ResourceDefinition {
            name: record.name.clone(),
            resource_type: record.resource_type.clone(),
            properties: record.stored_properties_data.clone().unwrap_or_default(),
            metadata: record.metadata.clone(),
            depends_on: Vec::new(),
        };
        Ok(Self {
            record,
            definition,
            stack,
            resource_type,
            engine,
            breakpoints: Breakpoints::none(),
        })
    }

    /// Pause points to honour before create/update
    pub fn with_breakpoints(mut self, breakpoints: Breakpoints) -> Self {
        self.breakpoints = breakpoints;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Resource {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn type_name(&self) -> &str {
        &self.record.resource_type
    }

    pub fn state(&self) -> State {
        self.record.state()
    }

    pub fn status_reason(&self) -> &str {
        &self.record.status_reason
    }

    pub fn physical_id(&self) -> Option<&str> {
        self.record.physical_id.as_deref()
    }

    /// Store id, once persisted
    pub fn id(&self) -> Option<i64> {
        self.record.id
    }

    pub fn uuid(&self) -> uuid::Uuid {
        self.record.uuid
    }

    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    pub fn stack(&self) -> &StackContext {
        &self.stack
    }

    pub fn resource_data(&self) -> &ResourceData {
        &self.record.resource_data
    }

    pub fn stored_properties(&self) -> Option<&PropertyMap> {
        self.record.stored_properties_data.as_ref()
    }

    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.record.created_time
    }

    pub fn updated_time(&self) -> Option<DateTime<Utc>> {
        self.record.updated_time
    }

    fn properties_path(&self) -> String {
        format!("{}.Properties", self.record.name)
    }

    /// Validated properties of the current definition
    pub fn properties(&self) -> Result<PropertyMap> {
        schema::validate(
            &self.definition.properties,
            &self.resource_type.properties_schema,
            &self.properties_path(),
            self.engine.config.strict_validate,
        )
    }

    /// Properties handed to delete/suspend/resume/check handlers: the last
    /// applied snapshot if there is one.
    fn current_properties(&self) -> PropertyMap {
        self.record
            .stored_properties_data
            .clone()
            .or_else(|| self.properties().ok())
            .unwrap_or_else(|| self.definition.properties.clone())
    }

    /// Template metadata until the resource is stored, stored metadata after
    pub fn metadata_get(&self) -> &PropertyMap {
        if !self.record.is_stored() || self.record.action == Action::Init {
            &self.definition.metadata
        } else {
            &self.record.metadata
        }
    }

    /// Replace the stored metadata
    pub async fn metadata_set(&mut self, metadata: PropertyMap) -> Result<()> {
        let Some(id) = self.record.id.filter(|_| self.record.action != Action::Init) else {
            return Err(Error::InvalidState {
                message: format!("The Resource ({}) is not available.", self.record.name),
            });
        };
        self.record.metadata = metadata;
        self.engine.store.update(id, &self.record).await?;
        Ok(())
    }

    /// Provider-side name: `<stack>-<name>-<short_id>`, shortened to the
    /// configured or type-specific limit
    pub fn physical_resource_name(&self) -> Result<String> {
        let limit = self
            .engine
            .config
            .physical_name_limit
            .or(self.resource_type.physical_name_limit);
        naming::physical_resource_name(&self.stack.name, &self.record.name, &self.record.uuid, limit)
    }

    /// Export snapshot for abandoning the resource
    pub fn prepare_abandon(&self) -> AbandonData {
        AbandonData {
            action: self.record.action,
            status: self.record.status,
            name: self.record.name.clone(),
            resource_type: self.record.resource_type.clone(),
            resource_id: self.record.physical_id.clone(),
            metadata: self.metadata_get().clone(),
            resource_data: self.record.resource_data.clone(),
        }
    }

    /// Resolve an output attribute, caching the value on the record
    pub async fn get_attribute(&mut self, name: &str) -> Result<Value> {
        let Some(attribute) = self.resource_type.attributes_schema.get(name) else {
            return Err(Error::InvalidTemplateAttribute {
                resource: self.record.name.clone(),
                attribute: name.to_string(),
            });
        };
        if let Some(cached) = self.record.attributes.get(name) {
            return Ok(cached.clone());
        }

        let properties = self.current_properties();
        let handler = self.resource_type.handler();
        let value = {
            let ctx = HandlerContext::new(
                &self.record.name,
                &self.record.resource_type,
                &self.stack.name,
                &properties,
                &mut self.record.physical_id,
                &mut self.record.resource_data,
            );
            handler.resolve_attribute(&ctx, name).await?
        };
        attribute.check(name, &value);

        self.record.attributes.insert(name.to_string(), value.clone());
        if let Some(id) = self.record.id {
            self.engine.store.update(id, &self.record).await?;
        }
        Ok(value)
    }
}

// ============================================================================
// State Transitions
// ============================================================================

impl Resource {
    /// Move to (action, status) and persist both in a single store write.
    ///
    /// `updated_time` is only touched when an UPDATE completes after a
    /// CREATE or UPDATE. On a store failure the in-memory state is rolled
    /// back.
    pub async fn state_set(&mut self, action: Action, status: Status, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let previous = self.record.clone();
        let old_state = previous.state();
        let new_state = State::new(action, status);

        self.record.action = action;
        self.record.status = status;
        self.record.status_reason.clone_from(&reason);
        if matches!(old_state.action, Action::Create | Action::Update)
            && new_state == State::new(Action::Update, Status::Complete)
        {
            self.record.updated_time = Some(Utc::now());
        }
        if status == Status::InProgress
            && matches!(action, Action::Create | Action::Update | Action::Adopt | Action::Delete)
        {
            self.record.attributes.clear();
        }

        if let Err(e) = self.store_or_update().await {
            self.record = previous;
            return Err(e);
        }

        log::debug!("{} {old_state} -> {new_state}", self.record.name);
        if new_state != old_state {
            self.emit(action, status, &reason);
        }
        Ok(())
    }

    /// String form of [`Resource::state_set`]; unknown names fail with
    /// `InvalidState` and leave the state untouched.
    pub async fn state_set_named(&mut self, action: &str, status: &str, reason: impl Into<String>) -> Result<()> {
        let action: Action = action.parse()?;
        let status: Status = status.parse()?;
        self.state_set(action, status, reason).await
    }

    /// Persist the record without a transition
    pub async fn store(&mut self) -> Result<()> {
        self.store_or_update().await
    }

    async fn store_or_update(&mut self) -> Result<()> {
        match self.record.id {
            Some(id) => self.engine.store.update(id, &self.record).await?,
            None => {
                if self.record.created_time.is_none() {
                    self.record.created_time = Some(Utc::now());
                }
                let id = self.engine.store.create(&self.record).await?;
                self.record.id = Some(id);
            }
        }
        Ok(())
    }

    /// Back to (INIT, COMPLETE) with a fresh identity, ready to be created
    /// again. The old record stays in the store.
    pub fn state_reset(&mut self) {
        let mut record = ResourceRecord::new(
            &self.record.name,
            &self.record.resource_type,
            self.stack.id.as_deref(),
        );
        record.metadata = self.definition.metadata.clone();
        self.record = record;
    }

    fn emit(&self, action: Action, status: Status, reason: &str) {
        self.engine.events.record(&Event {
            resource: self.record.name.clone(),
            physical_id: self.record.physical_id.clone(),
            action,
            status,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn transition(&mut self, action: Action, status: Status) -> std::result::Result<(), ResourceFailure> {
        match self.state_set(action, status, STATE_CHANGED).await {
            Ok(()) => Ok(()),
            Err(e) => Err(ResourceFailure::new(&self.record.name, action, &e)),
        }
    }

    /// Reject an action without touching the record
    fn refuse(&self, action: Action, message: String) -> ResourceFailure {
        let state = self.state();
        log::debug!("{}: {message}", self.record.name);
        self.emit(state.action, state.status, &message);
        ResourceFailure::exception(&self.record.name, action, message)
    }

    async fn fail(&mut self, action: Action, cause: &Error) -> ResourceFailure {
        let failure = ResourceFailure::new(&self.record.name, action, cause);
        self.fail_with(failure).await
    }

    async fn fail_with(&mut self, failure: ResourceFailure) -> ResourceFailure {
        log::warn!("{} {} failed: {failure}", self.record.name, failure.action);
        if let Err(e) = self
            .state_set(failure.action, Status::Failed, failure.to_string())
            .await
        {
            log::error!("Could not record failure of {}: {e}", self.record.name);
        }
        failure
    }

    async fn run_handler(&mut self, call: HandlerCall<'_>, properties: &PropertyMap) -> Result<()> {
        let handler = self.resource_type.handler();
        let poll_interval = self.engine.config.poll_interval();
        let mut ctx = HandlerContext::new(
            &self.record.name,
            &self.record.resource_type,
            &self.stack.name,
            properties,
            &mut self.record.physical_id,
            &mut self.record.resource_data,
        );
        executor::execute(handler.as_ref(), call, &mut ctx, poll_interval).await
    }

    fn supports(&self, operation: Operation) -> bool {
        self.resource_type.handler().capabilities().contains(operation)
    }

    /// Trigger `hook` and wait until it is cleared, if a breakpoint is set
    async fn break_if_required(&mut self, hook: Hook) -> Result<()> {
        if !self.breakpoints.matches(hook) {
            return Ok(());
        }

        hooks::trigger_hook(&mut self.record.resource_data, hook);
        self.store_or_update().await?;
        let state = self.state();
        self.emit(
            state.action,
            state.status,
            &format!("{} paused until Hook {hook} is cleared", hook.action()),
        );
        log::info!("Reached hook on {self}");

        let Some(id) = self.record.id else {
            return Ok(());
        };
        let store = Arc::clone(&self.engine.store);
        hooks::wait_until_cleared(hook, self.engine.config.hook_poll_interval(), || {
            let store = Arc::clone(&store);
            async move {
                store
                    .get(id)
                    .await
                    .map(|record| record.resource_data)
                    .map_err(Error::from)
            }
        })
        .await?;

        self.record.resource_data = store.get(id).await?.resource_data;
        Ok(())
    }
}

// ============================================================================
// Retry Targets
// ============================================================================

/// Create attempts, with delete as the cleanup between them
struct CreateAttempts<'r> {
    resource: &'r mut Resource,
    properties: &'r PropertyMap,
}

#[async_trait]
impl RetryTarget for CreateAttempts<'_> {
    async fn attempt(&mut self, phase: Phase) -> Result<()> {
        let resource = &mut *self.resource;
        let (action, call) = match phase {
            Phase::Primary => (Action::Create, HandlerCall::Create),
            Phase::Cleanup => (Action::Delete, HandlerCall::Delete),
        };

        if resource.state() != State::new(action, Status::InProgress) {
            resource
                .state_set(action, Status::InProgress, STATE_CHANGED)
                .await?;
        }
        match resource.run_handler(call, self.properties).await {
            Ok(()) => {
                if phase == Phase::Cleanup {
                    resource
                        .state_set(Action::Delete, Status::Complete, STATE_CHANGED)
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                let reason = ResourceFailure::new(&resource.record.name, action, &e).to_string();
                resource.state_set(action, Status::Failed, reason).await?;
                Err(e)
            }
        }
    }
}

/// Delete attempts; no cleanup
struct DeleteAttempts<'r> {
    resource: &'r mut Resource,
    properties: &'r PropertyMap,
}

#[async_trait]
impl RetryTarget for DeleteAttempts<'_> {
    async fn attempt(&mut self, _phase: Phase) -> Result<()> {
        self.resource
            .run_handler(HandlerCall::Delete, self.properties)
            .await
    }
}

// ============================================================================
// Actions
// ============================================================================

impl Resource {
    /// Create the resource. Allowed only from (INIT, COMPLETE).
    ///
    /// Retryable provider errors are cleaned up with a delete and retried
    /// up to `action_retry_limit` times.
    pub async fn create(&mut self) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Create;
        if self.state() != State::INITIAL {
            return Err(self.refuse(action, format!("State {} invalid for create", self.state())));
        }

        if let Err(e) = self.break_if_required(Hook::PreCreate).await {
            return Err(ResourceFailure::new(&self.record.name, action, &e));
        }

        log::info!("creating {self}");
        self.transition(action, Status::InProgress).await?;

        let properties = match self.properties() {
            Ok(properties) => properties,
            Err(e) => return Err(self.fail(action, &e).await),
        };

        let engine = self.engine.clone();
        let result = {
            let mut attempts = CreateAttempts {
                resource: &mut *self,
                properties: &properties,
            };
            run_with_retry(
                &engine.retry_policy(),
                engine.backoff.as_ref(),
                engine.retry_callback.as_ref(),
                true,
                &mut attempts,
            )
            .await
        };

        match result {
            Ok(()) => {
                self.record.stored_properties_data = Some(properties);
                self.transition(action, Status::Complete).await
            }
            Err(e) => Err(self.fail(action, &e).await),
        }
    }

    /// What `update(after)` would do, without doing it
    pub fn plan_update(&self, after: &ResourceDefinition) -> Result<ResourceChange> {
        if self.state() == State::INITIAL {
            return Ok(ResourceChange::Create);
        }
        Ok(match self.reconcile(after)? {
            UpdatePlan::Unchanged => ResourceChange::NoChange,
            UpdatePlan::Replace => ResourceChange::Replace,
            UpdatePlan::InPlace { property_diff, .. } => ResourceChange::Update(property_diff),
        })
    }

    fn reconcile(&self, after: &ResourceDefinition) -> Result<UpdatePlan> {
        let state = self.state();
        if state.status == Status::Failed
            || state == State::INITIAL
            || state == State::new(Action::Delete, Status::Complete)
        {
            return Ok(UpdatePlan::Replace);
        }
        if *after == self.definition {
            return Ok(UpdatePlan::Unchanged);
        }
        if self.engine.registry.get_class(&after.resource_type)?.name != self.resource_type.name {
            return Ok(UpdatePlan::Replace);
        }

        let schema = &self.resource_type.properties_schema;
        let after_properties = schema::validate(
            &after.properties,
            schema,
            &self.properties_path(),
            self.engine.config.strict_validate,
        )?;
        let before_properties = self.current_properties();

        let before_definition = ResourceDefinition {
            properties: before_properties.clone(),
            metadata: self.metadata_get().clone(),
            ..self.definition.clone()
        };
        let after_definition = ResourceDefinition {
            properties: after_properties.clone(),
            ..after.clone()
        };
        let template_diff = diff_template(&after_definition, &before_definition);
        if template_diff.is_empty() {
            return Ok(UpdatePlan::Unchanged);
        }

        match diff_properties(
            &after_properties,
            &before_properties,
            schema,
            &self.record.name,
            &self.record.resource_type,
        )? {
            Reconciliation::Replace => Ok(UpdatePlan::Replace),
            Reconciliation::InPlace(diff) if !diff.is_empty() && !self.supports(Operation::Update) => {
                Ok(UpdatePlan::Replace)
            }
            Reconciliation::InPlace(diff) => Ok(UpdatePlan::InPlace {
                properties: after_properties,
                template_diff,
                property_diff: diff,
            }),
        }
    }

    /// Update to `after`.
    ///
    /// `Ok(NeedsReplacement)` means the scheduler must destroy this instance
    /// and create a fresh one; the state is left as it was.
    pub async fn update(
        &mut self,
        after: &ResourceDefinition,
    ) -> std::result::Result<UpdateOutcome, ResourceFailure> {
        let action = Action::Update;
        let state = self.state();
        if state.is_in_progress() && matches!(state.action, Action::Create | Action::Update | Action::Adopt) {
            return Err(self.refuse(action, format!("State {state} invalid for update")));
        }

        let (properties, template_diff, property_diff) = match self.reconcile(after) {
            Ok(UpdatePlan::Unchanged) => {
                self.definition = after.clone();
                return Ok(UpdateOutcome::Completed);
            }
            Ok(UpdatePlan::Replace) => {
                log::info!("{self} requires replacement");
                return Ok(UpdateOutcome::NeedsReplacement(UpdateReplace::new(Some(
                    &self.record.name,
                ))));
            }
            Ok(UpdatePlan::InPlace {
                properties,
                template_diff,
                property_diff,
            }) => (properties, template_diff, property_diff),
            Err(e) => {
                self.transition(action, Status::InProgress).await?;
                return Err(self.fail(action, &e).await);
            }
        };

        if let Err(e) = self.break_if_required(Hook::PreUpdate).await {
            return Err(ResourceFailure::new(&self.record.name, action, &e));
        }

        log::info!("updating {self}");
        let prior_state = self.state();
        let prior_reason = self.record.status_reason.clone();
        self.transition(action, Status::InProgress).await?;

        let call = HandlerCall::Update {
            definition: after,
            template_diff: &template_diff,
            property_diff: &property_diff,
        };
        match self.run_handler(call, &properties).await {
            Ok(()) => {
                self.record.stored_properties_data = Some(properties);
                if template_diff.metadata.is_some() {
                    self.record.metadata = after.metadata.clone();
                }
                self.definition = after.clone();
                self.transition(action, Status::Complete).await?;
                Ok(UpdateOutcome::Completed)
            }
            Err(Error::Replace(replace)) => {
                if let Err(e) = self
                    .state_set(prior_state.action, prior_state.status, prior_reason)
                    .await
                {
                    return Err(ResourceFailure::new(&self.record.name, action, &e));
                }
                Ok(UpdateOutcome::NeedsReplacement(replace))
            }
            Err(e) => Err(self.fail(action, &e).await),
        }
    }

    /// Delete the provider-side object. A no-op for resources that were
    /// never created or are already deleted.
    pub async fn delete(&mut self) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Delete;
        let state = self.state();
        if state == State::new(Action::Delete, Status::Complete) || state.action == Action::Init {
            return Ok(());
        }
        if state.is_in_progress() && matches!(state.action, Action::Create | Action::Update | Action::Delete) {
            return Err(self.refuse(action, format!("State {state} invalid for delete")));
        }

        log::info!("deleting {self}");
        self.transition(action, Status::InProgress).await?;

        let properties = self.current_properties();
        let engine = self.engine.clone();
        let result = {
            let mut attempts = DeleteAttempts {
                resource: &mut *self,
                properties: &properties,
            };
            run_with_retry(
                &engine.retry_policy(),
                engine.backoff.as_ref(),
                engine.retry_callback.as_ref(),
                false,
                &mut attempts,
            )
            .await
        };

        match result {
            Ok(()) => self.transition(action, Status::Complete).await,
            Err(e) => Err(self.fail(action, &e).await),
        }
    }

    /// Delete, then make sure (DELETE, COMPLETE) is persisted
    pub async fn destroy(&mut self) -> std::result::Result<(), ResourceFailure> {
        self.delete().await?;
        if self.state() != State::new(Action::Delete, Status::Complete) {
            self.transition(Action::Delete, Status::Complete).await?;
        }
        Ok(())
    }

    pub async fn suspend(&mut self) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Suspend;
        let state = self.state();
        if state.action == Action::Delete || !matches!(state.status, Status::Complete | Status::Failed) {
            return Err(self.refuse(action, format!("State {state} invalid for suspend")));
        }
        self.simple_action(action, HandlerCall::Suspend).await
    }

    pub async fn resume(&mut self) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Resume;
        let state = self.state();
        if state != State::new(Action::Suspend, Status::Complete) {
            return Err(self.refuse(action, format!("State {state} invalid for resume")));
        }
        self.simple_action(action, HandlerCall::Resume).await
    }

    /// Verify the provider-side object. Types without a check handler
    /// complete immediately with a "not supported" reason.
    pub async fn check(&mut self) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Check;
        let state = self.state();
        if state.is_in_progress() || state == State::new(Action::Delete, Status::Complete) {
            return Err(self.refuse(action, format!("State {state} invalid for check")));
        }

        if !self.supports(Operation::Check) {
            let reason = format!("{action} not supported for {}", self.record.resource_type);
            return match self.state_set(action, Status::Complete, reason).await {
                Ok(()) => Ok(()),
                Err(e) => Err(ResourceFailure::new(&self.record.name, action, &e)),
            };
        }

        if state == State::INITIAL {
            let reason = format!("Can not check {}, resource not created yet.", self.record.name);
            if let Err(e) = self.state_set(action, Status::Failed, reason).await {
                log::error!("Could not record failure of {}: {e}", self.record.name);
            }
            return Err(ResourceFailure::exception(
                &self.record.name,
                action,
                format!("Resource {} not created yet.", self.record.name),
            ));
        }

        self.simple_action(action, HandlerCall::Check).await
    }

    async fn simple_action(&mut self, action: Action, call: HandlerCall<'_>) -> std::result::Result<(), ResourceFailure> {
        log::info!("{action} {self}");
        self.transition(action, Status::InProgress).await?;
        let properties = self.current_properties();
        match self.run_handler(call, &properties).await {
            Ok(()) => self.transition(action, Status::Complete).await,
            Err(e) => Err(self.fail(action, &e).await),
        }
    }

    /// Take over an existing provider-side object described by `data`
    pub async fn adopt(&mut self, data: Option<&AdoptData>) -> std::result::Result<(), ResourceFailure> {
        let action = Action::Adopt;
        if self.state() != State::INITIAL {
            return Err(self.refuse(action, format!("State {} invalid for adopt", self.state())));
        }

        self.transition(action, Status::InProgress).await?;
        let properties = match self.properties() {
            Ok(properties) => properties,
            Err(e) => return Err(self.fail(action, &e).await),
        };

        let Some((resource_id, data)) = data.and_then(|d| {
            d.resource_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| (id.to_string(), d))
        }) else {
            let failure = ResourceFailure::exception(&self.record.name, action, "Resource ID was not provided.");
            return Err(self.fail_with(failure).await);
        };

        self.record.physical_id = Some(resource_id);
        self.record
            .resource_data
            .extend(data.resource_data.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.record.metadata = data.metadata.clone();
        self.record.stored_properties_data = Some(properties);
        self.transition(action, Status::Complete).await
    }

    /// Deliver an external signal.
    ///
    /// `{"unset_hook": "<hook>"}` clears a pending hook; anything else goes
    /// to the type's signal handler.
    pub async fn signal(&mut self, details: Option<&Value>) -> std::result::Result<(), ResourceFailure> {
        let action = self.record.action;
        if matches!(action, Action::Suspend | Action::Delete) {
            return Err(self.refuse(action, format!("Cannot signal resource during {action}")));
        }

        let result = match details.and_then(|d| d.get("unset_hook")) {
            Some(hook) => self.unset_hook(hook).await,
            None => self.deliver_signal(details).await,
        };
        result.map_err(|e| {
            let failure = ResourceFailure::new(&self.record.name, action, &e);
            let state = self.state();
            self.emit(state.action, state.status, &failure.to_string());
            failure
        })
    }

    async fn unset_hook(&mut self, hook: &Value) -> Result<()> {
        let name = hook.as_str().map_or_else(|| hook.to_string(), ToString::to_string);
        let Ok(hook) = name.parse::<Hook>() else {
            return Err(Error::InvalidHook {
                message: format!("Invalid hook type \"{name}\" for {self}"),
            });
        };

        if let Some(id) = self.record.id {
            self.record.resource_data = self.engine.store.get(id).await?.resource_data;
        }
        if !hooks::has_hook(&self.record.resource_data, hook) {
            return Err(Error::InvalidHook {
                message: format!("The \"{hook}\" hook is not defined on {self}"),
            });
        }

        hooks::clear_hook(&mut self.record.resource_data, hook);
        if let Some(id) = self.record.id {
            self.engine.store.update(id, &self.record).await?;
        }
        log::info!("Cleared hook {hook} on {self}");
        Ok(())
    }

    async fn deliver_signal(&mut self, details: Option<&Value>) -> Result<()> {
        if !self.supports(Operation::Signal) {
            return Err(Error::ActionNotSupported {
                action: "Signal".to_string(),
            });
        }

        let properties = self.current_properties();
        let handler = self.resource_type.handler();
        {
            let mut ctx = HandlerContext::new(
                &self.record.name,
                &self.record.resource_type,
                &self.stack.name,
                &properties,
                &mut self.record.physical_id,
                &mut self.record.resource_data,
            );
            handler.handle_signal(&mut ctx, details).await?;
        }

        let state = self.state();
        self.emit(state.action, state.status, &signal_reason(details));
        if let Some(id) = self.record.id {
            self.engine.store.update(id, &self.record).await?;
        }
        Ok(())
    }
}

/// Event text describing a signal payload
fn signal_reason(details: Option<&Value>) -> String {
    match details {
        None => "No signal details provided".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => {
            if let (Some(previous), Some(current), Some(reason)) =
                (map.get("previous"), map.get("current"), map.get("reason"))
            {
                format!(
                    "alarm state changed from {} to {} ({})",
                    schema::display_value(previous),
                    schema::display_value(current),
                    schema::display_value(reason)
                )
            } else if let Some(reason) = map.get("reason") {
                schema::display_value(reason)
            } else {
                "Unknown".to_string()
            }
        }
        Some(_) => "Unknown".to_string(),
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.record.resource_type, self.record.name)?;
        if let Some(stack_id) = &self.stack.id {
            if let Some(physical_id) = &self.record.physical_id {
                write!(f, " [{physical_id}]")?;
            }
            write!(f, " Stack \"{}\" [{stack_id}]", self.stack.name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("record", &self.record)
            .field("definition", &self.definition)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

/// Same name and same definition, whatever the stack
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.record.name == other.record.name && self.definition == other.definition
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::MemoryEvents;
    use crate::handler::{Capabilities, GenericHandler, ResourceHandler};
    use crate::registry::TypeRegistry;
    use crate::retry::BackoffStrategy;
    use crate::schema::{AttributeSchema, AttributeType, PropertySchema};
    use crate::store::{MemoryStore, ResourceStore};
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    // ------------------------------------------------------------------------
    // Fixture
    // ------------------------------------------------------------------------

    /// Queued handler results plus a log of every call
    #[derive(Default)]
    struct Script {
        results: Mutex<BTreeMap<&'static str, VecDeque<Result<()>>>>,
        calls: Mutex<Vec<String>>,
        diffs: Mutex<Vec<PropertyMap>>,
    }

    impl Script {
        fn push(&self, op: &'static str, result: Result<()>) {
            self.results
                .lock()
                .unwrap()
                .entry(op)
                .or_default()
                .push_back(result);
        }

        fn next(&self, op: &'static str) -> Result<()> {
            self.calls.lock().unwrap().push(op.to_string());
            self.results
                .lock()
                .unwrap()
                .get_mut(op)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()))
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct ScriptedHandler {
        script: Arc<Script>,
        capabilities: Capabilities,
    }

    #[async_trait]
    impl ResourceHandler for ScriptedHandler {
        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn handle_create(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
            self.script.next("create")?;
            ctx.set_physical_id(format!("phys-{}", ctx.name));
            Ok(())
        }

        async fn handle_update(
            &self,
            _ctx: &mut HandlerContext<'_>,
            _new_definition: &ResourceDefinition,
            _template_diff: &TemplateDiff,
            property_diff: &PropertyMap,
        ) -> Result<()> {
            self.script.diffs.lock().unwrap().push(property_diff.clone());
            self.script.next("update")
        }

        async fn handle_delete(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
            self.script.next("delete")
        }

        async fn handle_suspend(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
            self.script.next("suspend")
        }

        async fn handle_resume(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
            self.script.next("resume")
        }

        async fn handle_check(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
            self.script.next("check")
        }

        async fn handle_signal(&self, _ctx: &mut HandlerContext<'_>, _details: Option<&Value>) -> Result<()> {
            self.script.next("signal")
        }

        async fn resolve_attribute(&self, ctx: &HandlerContext<'_>, name: &str) -> Result<Value> {
            self.script.calls.lock().unwrap().push(format!("attr {name}"));
            match name {
                "foo" => Ok(json!(ctx.physical_id())),
                _ => Ok(json!("not a map")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingBackoff {
        attempts: Mutex<Vec<u32>>,
    }

    impl BackoffStrategy for RecordingBackoff {
        fn delay(&self, attempt: u32, _jitter_max: f64) -> Duration {
            self.attempts.lock().unwrap().push(attempt);
            Duration::ZERO
        }
    }

    struct Fixture {
        engine: Engine,
        store: Arc<MemoryStore>,
        events: Arc<MemoryEvents>,
        script: Arc<Script>,
        backoff: Arc<RecordingBackoff>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(EngineConfig::immediate())
        }

        fn with_retries(limit: u32) -> Self {
            Self::with_config(EngineConfig::immediate().with_retry_limit(limit))
        }

        fn with_config(config: EngineConfig) -> Self {
            let script = Arc::new(Script::default());
            let mut registry = TypeRegistry::new();
            registry
                .register(ResourceType::new("GenericResourceType", Arc::new(GenericHandler)))
                .register_alias("OS::Test::GenericResource", "GenericResourceType")
                .register(
                    ResourceType::new(
                        "ResourceWithPropsType",
                        Arc::new(ScriptedHandler {
                            script: Arc::clone(&script),
                            capabilities: Capabilities::lifecycle()
                                .with(Operation::Check)
                                .with(Operation::Signal),
                        }),
                    )
                    .property("Foo", PropertySchema::string().update_allowed())
                    .property("FooInt", PropertySchema::integer().update_allowed())
                    .property("Bar", PropertySchema::string())
                    .property("Imm", PropertySchema::string().immutable())
                    .attribute("foo", AttributeSchema::new("Physical id").typed(AttributeType::String))
                    .attribute("attr2", AttributeSchema::new("A map").typed(AttributeType::Map)),
                )
                .register(
                    ResourceType::new("ResourceWithRequiredProps", Arc::new(GenericHandler))
                        .property("Foo", PropertySchema::string().required()),
                )
                .register(
                    ResourceType::new(
                        "NoUpdateType",
                        Arc::new(ScriptedHandler {
                            script: Arc::clone(&script),
                            capabilities: Capabilities::lifecycle().without(Operation::Update),
                        }),
                    )
                    .property("Foo", PropertySchema::string().update_allowed()),
                );

            let store = Arc::new(MemoryStore::new());
            let events = Arc::new(MemoryEvents::new());
            let backoff = Arc::new(RecordingBackoff::default());
            let engine = Engine::new(Arc::new(registry), store.clone())
                .with_config(config)
                .with_backoff(backoff.clone())
                .with_events(events.clone());
            Self {
                engine,
                store,
                events,
                script,
                backoff,
            }
        }

        async fn resource(&self, definition: ResourceDefinition) -> Resource {
            Resource::new(definition, stack(), self.engine.clone())
                .await
                .unwrap()
        }

        async fn props_resource(&self, foo: &str) -> Resource {
            self.resource(props_def().with_property("Foo", json!(foo))).await
        }

        async fn created(&self, definition: ResourceDefinition) -> Resource {
            let mut res = self.resource(definition).await;
            res.create().await.unwrap();
            res
        }

        async fn stored(&self, res: &Resource) -> ResourceRecord {
            self.store.get(res.id().unwrap()).await.unwrap()
        }

        fn backoff_attempts(&self) -> Vec<u32> {
            self.backoff.attempts.lock().unwrap().clone()
        }
    }

    fn stack() -> StackContext {
        StackContext::new("test_stack").with_id("stack-1")
    }

    fn props_def() -> ResourceDefinition {
        ResourceDefinition::new("test_resource", "ResourceWithPropsType")
    }

    fn in_error() -> Error {
        Error::resource_in_error("ERROR", "just because")
    }

    fn metadata(value: Value) -> PropertyMap {
        serde_json::from_value(value).unwrap()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_new_rejects_bad_definitions() {
        let fx = Fixture::new();
        let err = Resource::new(
            ResourceDefinition::new("bad/name", "GenericResourceType"),
            stack(),
            fx.engine.clone(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "StackValidationFailed");

        let err = Resource::new(ResourceDefinition::new("res", ""), stack(), fx.engine.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidResourceType");

        let err = Resource::new(ResourceDefinition::new("res", "NoExistResourceType"), stack(), fx.engine.clone())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The Resource Type (NoExistResourceType) could not be found.");
    }

    #[tokio::test]
    async fn test_new_defaults() {
        let fx = Fixture::new();
        let res = fx
            .resource(ResourceDefinition::new("res", "OS::Test::GenericResource"))
            .await;
        assert_eq!(res.state(), State::INITIAL);
        assert_eq!(res.status_reason(), "");
        assert!(res.id().is_none());
        assert!(res.physical_id().is_none());
        assert!(res.created_time().is_none());
        assert!(res.stored_properties().is_none());
        assert_eq!(res.record().stack_id.as_deref(), Some("stack-1"));
    }

    #[tokio::test]
    async fn test_new_during_stack_delete() {
        let fx = Fixture::new();
        let stack = stack().with_state(Action::Delete, Status::InProgress);
        let res = Resource::new(
            ResourceDefinition::new("res", "GenericResourceType"),
            stack,
            fx.engine.clone(),
        )
        .await
        .unwrap();
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));
    }

    #[tokio::test]
    async fn test_new_loads_latest_record() {
        let fx = Fixture::new();
        let res = fx.created(props_def().with_property("Foo", json!("abc"))).await;

        let again = fx.props_resource("abc").await;
        assert_eq!(again.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(again.id(), res.id());
        assert_eq!(again.uuid(), res.uuid());

        let unstored = Resource::new(props_def(), StackContext::new("test_stack"), fx.engine.clone())
            .await
            .unwrap();
        assert_eq!(unstored.state(), State::INITIAL);
    }

    #[tokio::test]
    async fn test_load_by_id() {
        let fx = Fixture::new();
        let res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        let loaded = Resource::load(res.id().unwrap(), stack(), fx.engine.clone())
            .await
            .unwrap();
        assert_eq!(loaded.state(), res.state());
        assert_eq!(loaded.definition().properties.get("Foo"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_display() {
        let fx = Fixture::new();
        let res = Resource::new(props_def(), StackContext::new("test_stack"), fx.engine.clone())
            .await
            .unwrap();
        assert_eq!(res.to_string(), "ResourceWithPropsType \"test_resource\"");

        let res = fx.props_resource("abc").await;
        assert_eq!(
            res.to_string(),
            "ResourceWithPropsType \"test_resource\" Stack \"test_stack\" [stack-1]"
        );

        let mut res = res;
        res.create().await.unwrap();
        assert_eq!(
            res.to_string(),
            "ResourceWithPropsType \"test_resource\" [phys-test_resource] Stack \"test_stack\" [stack-1]"
        );
    }

    #[tokio::test]
    async fn test_equality() {
        let fx = Fixture::new();
        let a = fx.props_resource("abc").await;
        let b = fx.props_resource("abc").await;
        let c = fx.props_resource("xyz").await;
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_state_set_named_rejects_unknown() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        let err = res.state_set_named("foo", "COMPLETE", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid action foo");
        let err = res.state_set_named("CREATE", "bla", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid status bla");
        assert_eq!(res.state(), State::INITIAL);
        assert!(res.id().is_none());
    }

    #[tokio::test]
    async fn test_state_set_persists() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.state_set(Action::Create, Status::Complete, "wibble").await.unwrap();
        let record = fx.stored(&res).await;
        assert_eq!(record.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(record.status_reason, "wibble");
        assert!(record.created_time.is_some());
        assert!(record.updated_time.is_none());

        assert_eq!(
            fx.events.triples(),
            vec![(Action::Create, Status::Complete, "wibble".to_string())]
        );
        // no event when the state does not change
        res.state_set(Action::Create, Status::Complete, "again").await.unwrap();
        assert_eq!(fx.events.triples().len(), 1);
        assert_eq!(fx.stored(&res).await.status_reason, "again");
    }

    #[tokio::test]
    async fn test_store_sets_created_time_once() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.store().await.unwrap();
        let created = res.created_time().unwrap();
        res.store().await.unwrap();
        assert_eq!(res.created_time(), Some(created));
        assert_eq!(fx.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_updated_time_only_after_update_complete() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.state_set(Action::Create, Status::Complete, "").await.unwrap();
        res.state_set(Action::Check, Status::Complete, "").await.unwrap();
        assert!(res.updated_time().is_none());

        res.state_set(Action::Update, Status::InProgress, "").await.unwrap();
        assert!(res.updated_time().is_none());
        res.state_set(Action::Update, Status::Complete, "").await.unwrap();
        assert!(res.updated_time().is_some());
        assert_eq!(fx.stored(&res).await.updated_time, res.updated_time());
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.create().await.unwrap();

        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(res.physical_id(), Some("phys-test_resource"));
        assert_eq!(res.stored_properties().unwrap().get("Foo"), Some(&json!("abc")));
        assert_eq!(fx.script.calls(), vec!["create"]);

        let record = fx.stored(&res).await;
        assert_eq!(record.physical_id.as_deref(), Some("phys-test_resource"));
        assert_eq!(
            fx.events.triples(),
            vec![
                (Action::Create, Status::InProgress, "state changed".to_string()),
                (Action::Create, Status::Complete, "state changed".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_fail_missing_required_prop() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("test_resource", "ResourceWithRequiredProps"))
            .await;
        let failure = res.create().await.unwrap_err();
        assert_eq!(
            failure.to_string(),
            "StackValidationFailed: Property error : test_resource.Properties: Property Foo not assigned"
        );
        assert_eq!(res.state(), State::new(Action::Create, Status::Failed));
        assert_eq!(res.status_reason(), failure.to_string());
    }

    #[tokio::test]
    async fn test_create_fail_prop_typo() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(props_def().with_property("Food", json!("abc")))
            .await;
        let failure = res.create().await.unwrap_err();
        assert_eq!(
            failure.to_string(),
            "StackValidationFailed: Property error : test_resource.Properties: Unknown Property Food"
        );
        assert_eq!(res.state(), State::new(Action::Create, Status::Failed));
        assert!(fx.script.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_is_refused() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        let failure = res.create().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: State (CREATE, COMPLETE) invalid for create");
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_create_retries_after_cleanup() {
        let fx = Fixture::with_retries(2);
        fx.script.push("create", Err(in_error()));
        let mut res = fx.props_resource("abc").await;
        res.create().await.unwrap();

        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "delete", "create"]);
        assert_eq!(fx.backoff_attempts(), vec![1]);
    }

    #[tokio::test]
    async fn test_create_retry_disabled() {
        let fx = Fixture::with_retries(0);
        fx.script.push("create", Err(in_error()));
        let mut res = fx.props_resource("abc").await;
        let failure = res.create().await.unwrap_err();

        assert_eq!(res.state(), State::new(Action::Create, Status::Failed));
        assert_eq!(
            res.status_reason(),
            "ResourceInError: Went to status ERROR due to \"just because\""
        );
        assert_eq!(failure.kind, "ResourceInError");
        assert_eq!(fx.script.calls(), vec!["create"]);
        assert!(fx.backoff_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_create_retries_failing_deletes() {
        let fx = Fixture::with_retries(2);
        fx.script.push("create", Err(in_error()));
        fx.script.push("delete", Err(in_error()));
        fx.script.push("delete", Err(in_error()));
        let mut res = fx.props_resource("abc").await;
        res.create().await.unwrap();

        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(
            fx.script.calls(),
            vec!["create", "delete", "delete", "delete", "create"]
        );
        assert_eq!(fx.backoff_attempts(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_create_retries_exhausted() {
        let fx = Fixture::with_retries(1);
        fx.script.push("create", Err(Error::resource_in_error("ERROR", "first")));
        fx.script.push("create", Err(Error::resource_in_error("ERROR", "second")));
        let mut res = fx.props_resource("abc").await;
        let failure = res.create().await.unwrap_err();

        assert_eq!(res.state(), State::new(Action::Create, Status::Failed));
        assert!(failure.message.contains("first"));
        assert_eq!(fx.script.calls(), vec!["create", "delete", "create"]);
    }

    #[tokio::test]
    async fn test_create_non_retryable_failure() {
        let fx = Fixture::with_retries(3);
        fx.script.push("create", Err(Error::provider("boom")));
        let mut res = fx.props_resource("abc").await;
        let failure = res.create().await.unwrap_err();

        assert_eq!(failure.to_string(), "Exception: boom");
        assert_eq!(res.state(), State::new(Action::Create, Status::Failed));
        assert_eq!(res.status_reason(), "Exception: boom");
        assert_eq!(fx.script.calls(), vec!["create"]);
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_plan_update() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        let same = props_def().with_property("Foo", json!("abc"));
        assert_eq!(res.plan_update(&same).unwrap(), ResourceChange::Create);

        res.create().await.unwrap();
        assert_eq!(res.plan_update(&same).unwrap(), ResourceChange::NoChange);

        let changed = props_def().with_property("Foo", json!("xyz"));
        let mut expected = PropertyMap::new();
        expected.insert("Foo".into(), json!("xyz"));
        assert_eq!(res.plan_update(&changed).unwrap(), ResourceChange::Update(expected));

        let replaced = same.clone().with_property("Bar", json!("b"));
        assert_eq!(res.plan_update(&replaced).unwrap(), ResourceChange::Replace);
    }

    #[tokio::test]
    async fn test_update_ok() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        let after = props_def().with_property("Foo", json!("xyz"));

        let outcome = res.update(&after).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Completed);
        assert_eq!(res.state(), State::new(Action::Update, Status::Complete));
        assert_eq!(res.definition(), &after);
        assert!(res.updated_time().is_some());
        assert_eq!(res.stored_properties().unwrap().get("Foo"), Some(&json!("xyz")));

        let diffs = fx.script.diffs.lock().unwrap().clone();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].get("Foo"), Some(&json!("xyz")));
        assert_eq!(
            fx.stored(&res).await.stored_properties_data.unwrap().get("Foo"),
            Some(&json!("xyz"))
        );
    }

    #[tokio::test]
    async fn test_update_removed_property_diffs_to_null() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        res.update(&props_def()).await.unwrap();

        let diffs = fx.script.diffs.lock().unwrap().clone();
        assert_eq!(diffs[0].get("Foo"), Some(&Value::Null));
        assert!(res.stored_properties().unwrap().get("Foo").is_none());
    }

    #[tokio::test]
    async fn test_update_identical_is_noop() {
        let fx = Fixture::new();
        let def = props_def().with_property("Foo", json!("abc"));
        let mut res = fx.created(def.clone()).await;
        let events = fx.events.triples().len();

        assert_eq!(res.update(&def).await.unwrap(), UpdateOutcome::Completed);
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(fx.events.triples().len(), events);
        assert!(fx.script.diffs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_equivalent_after_validation_is_noop() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("FooInt", json!(3))).await;
        let after = props_def().with_property("FooInt", json!("3"));
        assert_eq!(res.update(&after).await.unwrap(), UpdateOutcome::Completed);
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert!(fx.script.diffs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replace() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Bar", json!("abc"))).await;
        let outcome = res
            .update(&props_def().with_property("Bar", json!("xyz")))
            .await
            .unwrap();
        match outcome {
            UpdateOutcome::NeedsReplacement(replace) => {
                assert_eq!(replace.to_string(), "The Resource test_resource requires replacement.");
            }
            other => panic!("expected replacement, got {other:?}"),
        }
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_update_from_failed_needs_replacement() {
        let fx = Fixture::new();
        let def = props_def().with_property("Foo", json!("abc"));
        let mut res = fx.resource(def.clone()).await;
        res.state_set(Action::Create, Status::Failed, "").await.unwrap();
        assert!(res.update(&def).await.unwrap().needs_replacement());

        let mut fresh = fx
            .resource(ResourceDefinition::new("other", "ResourceWithPropsType"))
            .await;
        assert!(fresh.update(&def).await.unwrap().needs_replacement());
    }

    #[tokio::test]
    async fn test_update_after_delete_needs_replacement() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        res.delete().await.unwrap();

        let changed = props_def().with_property("Foo", json!("xyz"));
        assert_eq!(res.plan_update(&changed).unwrap(), ResourceChange::Replace);
        assert!(res.update(&changed).await.unwrap().needs_replacement());
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "delete"]);
    }

    #[tokio::test]
    async fn test_update_type_change_needs_replacement() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        let after = ResourceDefinition::new("test_resource", "GenericResourceType");
        assert!(res.update(&after).await.unwrap().needs_replacement());
    }

    #[tokio::test]
    async fn test_update_immutable_property() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Imm", json!("a"))).await;
        let failure = res
            .update(&props_def().with_property("Imm", json!("b")))
            .await
            .unwrap_err();
        assert_eq!(
            failure.to_string(),
            "NotSupported: Update to properties Imm of test_resource (ResourceWithPropsType) is not supported."
        );
        assert_eq!(res.state(), State::new(Action::Update, Status::Failed));
    }

    #[tokio::test]
    async fn test_update_fail_prop_typo() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        let failure = res
            .update(&props_def().with_property("Food", json!("xyz")))
            .await
            .unwrap_err();
        assert!(failure.message.contains("Unknown Property Food"));
        assert_eq!(res.state(), State::new(Action::Update, Status::Failed));
        assert!(fx
            .events
            .triples()
            .contains(&(Action::Update, Status::InProgress, "state changed".to_string())));
    }

    #[tokio::test]
    async fn test_update_handler_requests_replacement() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        fx.script.push(
            "update",
            Err(Error::Replace(UpdateReplace::new(Some("test_resource")))),
        );

        let outcome = res
            .update(&props_def().with_property("Foo", json!("xyz")))
            .await
            .unwrap();
        assert!(outcome.needs_replacement());
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_eq!(fx.stored(&res).await.state(), State::new(Action::Create, Status::Complete));
    }

    #[tokio::test]
    async fn test_update_without_update_handler() {
        let fx = Fixture::new();
        let def = ResourceDefinition::new("test_resource", "NoUpdateType").with_property("Foo", json!("a"));
        let mut res = fx.created(def).await;
        let after = ResourceDefinition::new("test_resource", "NoUpdateType").with_property("Foo", json!("b"));
        assert!(res.update(&after).await.unwrap().needs_replacement());
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
    }

    #[tokio::test]
    async fn test_update_in_progress_is_refused() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.state_set(Action::Update, Status::InProgress, "").await.unwrap();

        let failure = res
            .update(&props_def().with_property("Foo", json!("xyz")))
            .await
            .unwrap_err();
        assert_eq!(failure.to_string(), "Exception: State (UPDATE, IN_PROGRESS) invalid for update");
        assert_eq!(res.state(), State::new(Action::Update, Status::InProgress));
    }

    #[tokio::test]
    async fn test_update_handler_failure() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def().with_property("Foo", json!("abc"))).await;
        fx.script.push("update", Err(Error::provider("boom")));

        let failure = res
            .update(&props_def().with_property("Foo", json!("xyz")))
            .await
            .unwrap_err();
        assert_eq!(failure.to_string(), "Exception: boom");
        assert_eq!(res.state(), State::new(Action::Update, Status::Failed));
        assert_eq!(res.stored_properties().unwrap().get("Foo"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_update_metadata_only() {
        let fx = Fixture::new();
        let def = props_def().with_property("Foo", json!("abc"));
        let mut res = fx.created(def.clone()).await;
        let after = def.with_metadata(metadata(json!({"role": "web"})));

        assert_eq!(res.update(&after).await.unwrap(), UpdateOutcome::Completed);
        assert_eq!(res.state(), State::new(Action::Update, Status::Complete));
        assert_eq!(res.metadata_get(), &metadata(json!({"role": "web"})));
        assert_eq!(fx.stored(&res).await.metadata, metadata(json!({"role": "web"})));
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_never_created_is_noop() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.delete().await.unwrap();
        assert_eq!(res.state(), State::INITIAL);
        assert!(fx.script.calls().is_empty());
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.delete().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "delete"]);

        // already deleted
        res.delete().await.unwrap();
        assert_eq!(fx.script.calls(), vec!["create", "delete"]);
    }

    #[tokio::test]
    async fn test_delete_retries() {
        let fx = Fixture::with_retries(2);
        let mut res = fx.created(props_def()).await;
        fx.script.push("delete", Err(in_error()));
        res.delete().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "delete", "delete"]);
        assert_eq!(fx.backoff_attempts(), vec![1]);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        fx.script.push("delete", Err(in_error()));
        let failure = res.delete().await.unwrap_err();
        assert_eq!(failure.kind, "ResourceInError");
        assert_eq!(res.state(), State::new(Action::Delete, Status::Failed));
    }

    #[tokio::test]
    async fn test_delete_in_progress_is_refused() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        res.state_set(Action::Create, Status::InProgress, "").await.unwrap();
        let failure = res.delete().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: State (CREATE, IN_PROGRESS) invalid for delete");
        assert_eq!(res.state(), State::new(Action::Create, Status::InProgress));
    }

    #[tokio::test]
    async fn test_destroy_reset_and_recreate() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        let (old_uuid, old_id) = (res.uuid(), res.id());

        res.destroy().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));

        res.state_reset();
        assert_eq!(res.state(), State::INITIAL);
        assert!(res.id().is_none());
        assert!(res.physical_id().is_none());
        assert!(res.stored_properties().is_none());
        assert_ne!(res.uuid(), old_uuid);

        res.create().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert_ne!(res.id(), old_id);
        assert_eq!(fx.store.len().await, 2);
    }

    // ------------------------------------------------------------------------
    // Suspend / Resume / Check
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_suspend_resume() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.suspend().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Suspend, Status::Complete));
        res.resume().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Resume, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "suspend", "resume"]);
    }

    #[tokio::test]
    async fn test_suspend_refused_while_in_progress() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        for action in [Action::Create, Action::Update, Action::Delete] {
            res.state_set(action, Status::InProgress, "").await.unwrap();
            let failure = res.suspend().await.unwrap_err();
            assert_eq!(failure.kind, "Exception");
            assert_eq!(res.state(), State::new(action, Status::InProgress));
        }
    }

    #[tokio::test]
    async fn test_suspend_refused_after_delete() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.delete().await.unwrap();
        let failure = res.suspend().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: State (DELETE, COMPLETE) invalid for suspend");
    }

    #[tokio::test]
    async fn test_suspend_allowed_states() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        for action in Action::ALL {
            for status in Status::ALL {
                res.state_set(action, status, "").await.unwrap();
                let allowed =
                    action != Action::Delete && matches!(status, Status::Complete | Status::Failed);
                if allowed {
                    res.suspend().await.unwrap();
                    assert_eq!(res.state(), State::new(Action::Suspend, Status::Complete));
                } else {
                    let failure = res.suspend().await.unwrap_err();
                    assert!(failure.message.contains("invalid for suspend"));
                    assert_eq!(res.state(), State::new(action, status));
                }
            }
        }
        let suspends = fx.script.calls().iter().filter(|c| c.as_str() == "suspend").count();
        assert_eq!(suspends, (Action::ALL.len() - 1) * 2);
    }

    #[tokio::test]
    async fn test_suspend_failure() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        fx.script.push("suspend", Err(Error::provider("boom")));
        let failure = res.suspend().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: boom");
        assert_eq!(res.state(), State::new(Action::Suspend, Status::Failed));
    }

    #[tokio::test]
    async fn test_resume_requires_suspend_complete() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        for action in Action::ALL {
            for status in Status::ALL {
                if (action, status) == (Action::Suspend, Status::Complete) {
                    continue;
                }
                res.state_set(action, status, "").await.unwrap();
                let failure = res.resume().await.unwrap_err();
                assert!(failure.message.contains("invalid for resume"));
                assert_eq!(res.state(), State::new(action, status));
            }
        }
        assert!(fx.script.calls().is_empty());
    }

    #[tokio::test]
    async fn test_check_supported() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.check().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Check, Status::Complete));
        assert!(!res.status_reason().contains("not supported"));
        assert_eq!(fx.script.calls(), vec!["create", "check"]);
    }

    #[tokio::test]
    async fn test_check_not_supported() {
        let fx = Fixture::new();
        let mut res = fx
            .created(ResourceDefinition::new("res", "GenericResourceType"))
            .await;
        res.check().await.unwrap();
        assert_eq!(res.state(), State::new(Action::Check, Status::Complete));
        assert_eq!(res.status_reason(), "CHECK not supported for GenericResourceType");
    }

    #[tokio::test]
    async fn test_check_failed() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        fx.script.push("check", Err(Error::provider("boom")));
        res.check().await.unwrap_err();
        assert_eq!(res.state(), State::new(Action::Check, Status::Failed));
        assert!(res.status_reason().contains("boom"));
    }

    #[tokio::test]
    async fn test_check_after_delete_is_refused() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.delete().await.unwrap();
        let failure = res.check().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: State (DELETE, COMPLETE) invalid for check");
        assert_eq!(res.state(), State::new(Action::Delete, Status::Complete));
        assert_eq!(fx.script.calls(), vec!["create", "delete"]);
    }

    #[tokio::test]
    async fn test_check_not_created() {
        let fx = Fixture::new();
        let mut res = fx.props_resource("abc").await;
        let failure = res.check().await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: Resource test_resource not created yet.");
        assert_eq!(res.state(), State::new(Action::Check, Status::Failed));
        assert_eq!(
            res.status_reason(),
            "Can not check test_resource, resource not created yet."
        );
    }

    // ------------------------------------------------------------------------
    // Adopt / Abandon
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_adopt() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("foo", "GenericResourceType"))
            .await;
        let data = AdoptData {
            resource_id: Some("test-res-id".into()),
            ..Default::default()
        };
        res.adopt(Some(&data)).await.unwrap();
        assert_eq!(res.state(), State::new(Action::Adopt, Status::Complete));
        assert_eq!(res.physical_id(), Some("test-res-id"));
        assert!(res.metadata_get().is_empty());
    }

    #[tokio::test]
    async fn test_adopt_with_data_and_metadata() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("foo", "GenericResourceType"))
            .await;
        let mut data = AdoptData {
            resource_id: Some("test-res-id".into()),
            metadata: metadata(json!({"os_distro": "test-distro"})),
            ..Default::default()
        };
        data.resource_data.insert("test-key".into(), "test-value".into());

        res.adopt(Some(&data)).await.unwrap();
        assert_eq!(res.resource_data().get("test-key").map(String::as_str), Some("test-value"));
        assert_eq!(res.metadata_get(), &metadata(json!({"os_distro": "test-distro"})));
        let record = fx.stored(&res).await;
        assert_eq!(record.resource_data.get("test-key").map(String::as_str), Some("test-value"));
    }

    #[tokio::test]
    async fn test_adopt_missing_resource_id() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("foo", "GenericResourceType"))
            .await;
        let failure = res.adopt(None).await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: Resource ID was not provided.");
        assert_eq!(res.state(), State::new(Action::Adopt, Status::Failed));
        assert_eq!(res.status_reason(), "Exception: Resource ID was not provided.");
    }

    #[tokio::test]
    async fn test_prepare_abandon() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("foo", "GenericResourceType"))
            .await;
        res.record.resource_data.insert("test-key".into(), "test-value".into());

        let mut resource_data = ResourceData::new();
        resource_data.insert("test-key".into(), "test-value".into());
        assert_eq!(
            res.prepare_abandon(),
            AbandonData {
                action: Action::Init,
                status: Status::Complete,
                name: "foo".into(),
                resource_type: "GenericResourceType".into(),
                resource_id: None,
                metadata: PropertyMap::new(),
                resource_data,
            }
        );
    }

    // ------------------------------------------------------------------------
    // Signal / Hooks
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_signal_refused_during_suspend_and_delete() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        for action in [Action::Suspend, Action::Delete] {
            for status in Status::ALL {
                res.state_set(action, status, "").await.unwrap();
                let failure = res.signal(None).await.unwrap_err();
                let message = format!("Cannot signal resource during {action}");
                assert_eq!(failure.to_string(), format!("Exception: {message}"));
                assert_eq!(fx.events.triples().last(), Some(&(action, status, message)));
            }
        }
        assert!(!fx.script.calls().contains(&"signal".to_string()));
    }

    #[tokio::test]
    async fn test_signal_unset_hook() {
        let fx = Fixture::new();
        let mut res = fx
            .resource(ResourceDefinition::new("res", "GenericResourceType"))
            .await;
        hooks::trigger_hook(&mut res.record.resource_data, Hook::PreCreate);
        hooks::trigger_hook(&mut res.record.resource_data, Hook::PreUpdate);
        res.store().await.unwrap();

        for details in [None, Some(json!({}))] {
            let failure = res.signal(details.as_ref()).await.unwrap_err();
            assert_eq!(
                failure.to_string(),
                "ResourceActionNotSupported: Signal is not supported for resource."
            );
        }

        let failure = res
            .signal(Some(&json!({"unset_hook": "unknown_hook"})))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, "ResourceActionNotSupported");
        assert!(failure.message.starts_with("Invalid hook type \"unknown_hook\" for GenericResourceType \"res\""));
        assert!(hooks::has_hook(&fx.stored(&res).await.resource_data, Hook::PreCreate));

        res.signal(Some(&json!({"unset_hook": "pre-create"}))).await.unwrap();
        assert!(!hooks::has_hook(&fx.stored(&res).await.resource_data, Hook::PreCreate));
        assert!(hooks::has_hook(&fx.stored(&res).await.resource_data, Hook::PreUpdate));

        res.signal(Some(&json!({"unset_hook": "pre-update"}))).await.unwrap();
        assert!(!hooks::has_hook(&fx.stored(&res).await.resource_data, Hook::PreUpdate));

        let failure = res
            .signal(Some(&json!({"unset_hook": "pre-create"})))
            .await
            .unwrap_err();
        assert!(failure.message.starts_with("The \"pre-create\" hook is not defined on"));
    }

    #[tokio::test]
    async fn test_signal_handler() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        res.signal(Some(&json!({"reason": "alarm"}))).await.unwrap();
        assert_eq!(fx.script.calls(), vec!["create", "signal"]);
        assert_eq!(
            fx.events.triples().last(),
            Some(&(Action::Create, Status::Complete, "alarm".to_string()))
        );
    }

    #[tokio::test]
    async fn test_signal_handler_failure() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        fx.script.push("signal", Err(Error::provider("bad")));
        let failure = res.signal(Some(&json!("go"))).await.unwrap_err();
        assert_eq!(failure.to_string(), "Exception: bad");
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
    }

    #[test]
    fn test_signal_reason() {
        assert_eq!(signal_reason(None), "No signal details provided");
        assert_eq!(signal_reason(Some(&json!("scale up"))), "scale up");
        assert_eq!(
            signal_reason(Some(&json!({"previous": "ok", "current": "alarm", "reason": "cpu"}))),
            "alarm state changed from ok to alarm (cpu)"
        );
        assert_eq!(signal_reason(Some(&json!({"reason": "manual"}))), "manual");
        assert_eq!(signal_reason(Some(&json!({"other": 1}))), "Unknown");
        assert_eq!(signal_reason(Some(&json!(42))), "Unknown");
    }

    #[tokio::test]
    async fn test_pre_create_hook_pauses_until_cleared() {
        let mut config = EngineConfig::immediate();
        config.hook_poll_interval_ms = 1;
        let fx = Fixture::with_config(config);
        let mut res = fx
            .resource(ResourceDefinition::new("res", "GenericResourceType"))
            .await
            .with_breakpoints(Breakpoints::none().with(Hook::PreCreate));

        let handle = tokio::spawn(async move {
            let result = res.create().await;
            (res, result)
        });

        let id = loop {
            if let Some(record) = fx.store.get_by_name_and_stack("res", "stack-1").await.unwrap() {
                if hooks::has_hook(&record.resource_data, Hook::PreCreate) {
                    break record.id.unwrap();
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        assert!(!handle.is_finished());

        let mut other = Resource::load(id, stack(), fx.engine.clone()).await.unwrap();
        other
            .signal(Some(&json!({"unset_hook": "pre-create"})))
            .await
            .unwrap();

        let (res, result) = handle.await.unwrap();
        result.unwrap();
        assert_eq!(res.state(), State::new(Action::Create, Status::Complete));
        assert!(!hooks::has_hook(res.resource_data(), Hook::PreCreate));
        assert!(fx.events.triples().iter().any(|(action, _, reason)| {
            *action == Action::Init && reason == "CREATE paused until Hook pre-create is cleared"
        }));
    }

    #[tokio::test]
    async fn test_no_breakpoint_no_hook() {
        let fx = Fixture::new();
        let res = fx.created(ResourceDefinition::new("res", "GenericResourceType")).await;
        assert!(!hooks::has_hook(res.resource_data(), Hook::PreCreate));
    }

    // ------------------------------------------------------------------------
    // Attributes / Naming / Metadata
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_attribute_unknown() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        let err = res.get_attribute("bogus").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "The Referenced Attribute (test_resource bogus) is incorrect."
        );
    }

    #[tokio::test]
    async fn test_get_attribute_is_cached() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        assert_eq!(res.get_attribute("foo").await.unwrap(), json!("phys-test_resource"));
        assert_eq!(res.get_attribute("foo").await.unwrap(), json!("phys-test_resource"));
        let resolved = fx
            .script
            .calls()
            .iter()
            .filter(|c| c.as_str() == "attr foo")
            .count();
        assert_eq!(resolved, 1);
        assert_eq!(
            fx.stored(&res).await.attributes.get("foo"),
            Some(&json!("phys-test_resource"))
        );

        // a new action invalidates the cache
        res.update(&props_def().with_property("Foo", json!("x"))).await.unwrap();
        res.get_attribute("foo").await.unwrap();
        let resolved = fx
            .script
            .calls()
            .iter()
            .filter(|c| c.as_str() == "attr foo")
            .count();
        assert_eq!(resolved, 2);
    }

    #[tokio::test]
    async fn test_get_attribute_type_mismatch_is_returned() {
        let fx = Fixture::new();
        let mut res = fx.created(props_def()).await;
        assert_eq!(res.get_attribute("attr2").await.unwrap(), json!("not a map"));
    }

    #[tokio::test]
    async fn test_physical_resource_name() {
        let fx = Fixture::new();
        let res = fx.props_resource("abc").await;
        let name = res.physical_resource_name().unwrap();
        assert!(name.starts_with("test_stack-test_resource-"));
        assert_eq!(name.len(), "test_stack-test_resource-".len() + 12);

        let mut config = EngineConfig::immediate();
        config.physical_name_limit = Some(20);
        let fx = Fixture::with_config(config);
        let res = fx.props_resource("abc").await;
        let name = res.physical_resource_name().unwrap();
        assert_eq!(name.len(), 20);
        assert!(name.starts_with("te-"));
    }

    #[tokio::test]
    async fn test_metadata_get_set() {
        let fx = Fixture::new();
        let def = props_def().with_metadata(metadata(json!({"Test": "Initial metadata"})));
        let mut res = fx.resource(def).await;
        assert_eq!(res.metadata_get(), &metadata(json!({"Test": "Initial metadata"})));

        let err = res.metadata_set(metadata(json!({"Test": "x"}))).await.unwrap_err();
        assert_eq!(err.to_string(), "The Resource (test_resource) is not available.");

        res.create().await.unwrap();
        res.metadata_set(metadata(json!({"Test": "New metadata"})))
            .await
            .unwrap();
        assert_eq!(res.metadata_get(), &metadata(json!({"Test": "New metadata"})));
        assert_eq!(fx.stored(&res).await.metadata, metadata(json!({"Test": "New metadata"})));
    }
}
