use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::consumer::failed::FailedTransitionTracker;
use crate::consumer::planner::UpdatePlanner;
use crate::error::{BoxError, RelayError, RelayResult};
use crate::producer::config::ProducerConfig;
use crate::producer::enforcer::SingleProducerEnforcer;
use crate::producer::executor::SnapshotPublishExecutor;
use crate::producer::listener::{CycleReport, CycleStatus, ProducerListener};
use crate::producer::validation::{run_validators, StagedState, Validator};
use crate::producer::version::VersionMinter;
use crate::runtime::listeners::{notify, panic_message};
use crate::runtime::metrics::{MetricsCollector, ProducerMetrics};
use crate::state::delta::{plan_transition, StagedTransition};
use crate::state::transition::apply_blob;
use crate::state::{Dataset, ReadState, WriteState};
use crate::storage::announcement::Announcer;
use crate::storage::blob::{format, Blob, BlobPayload, BytesSource, CodecOptions};
use crate::storage::catalog::{BlobPublisher, BlobRetriever};
use crate::types::{BlobType, TransitionKey, Version};

type Listeners = [Arc<dyn ProducerListener>];

/// Turns batches of writes into published versions.
///
/// Cycles are serialized: a second caller blocks until the running cycle
/// completes. Committed state only moves forward once every synchronous
/// publish has succeeded, so a failed cycle leaves the producer exactly
/// where it was.
pub struct Producer {
    publisher: Arc<dyn BlobPublisher>,
    announcer: Option<Arc<dyn Announcer>>,
    minter: Arc<dyn VersionMinter>,
    enforcer: Arc<dyn SingleProducerEnforcer>,
    snapshot_executor: Arc<dyn SnapshotPublishExecutor>,
    num_states_between_snapshots: u32,
    validators: RwLock<Vec<Arc<dyn Validator>>>,
    listeners: RwLock<Vec<Arc<dyn ProducerListener>>>,
    collector: Option<Arc<dyn MetricsCollector<ProducerMetrics>>>,
    codec: CodecOptions,
    integrity_check: bool,
    metrics: ProducerMetrics,
    cycle: Mutex<CycleBookkeeping>,
    committed: RwLock<Arc<ReadState>>,
}

#[derive(Debug, Default)]
struct CycleBookkeeping {
    states_since_snapshot: u32,
    snapshot_published: bool,
}

enum CycleOutcome {
    Published { version: Version, records: usize },
    Unchanged,
}

/// Blobs staged for one version, in publication order.
struct StagedBlobs {
    deltas: Vec<Blob>,
    snapshot: Option<Blob>,
}

impl Producer {
    pub fn new(config: ProducerConfig) -> RelayResult<Self> {
        let publisher = config.publisher.ok_or(RelayError::MissingCollaborator {
            component: "producer",
            name: "blob publisher",
        })?;

        Ok(Self {
            publisher,
            announcer: config.announcer,
            minter: config.version_minter,
            enforcer: config.enforcer,
            snapshot_executor: config.snapshot_executor,
            num_states_between_snapshots: config.num_states_between_snapshots,
            validators: RwLock::new(config.validators),
            listeners: RwLock::new(config.listeners),
            collector: config.metrics_collector,
            codec: config.codec,
            integrity_check: config.integrity_check,
            metrics: ProducerMetrics::new(),
            cycle: Mutex::new(CycleBookkeeping::default()),
            committed: RwLock::new(Arc::new(ReadState::empty())),
        })
    }

    /// Runs one populate, validate, publish and announce cycle.
    ///
    /// Returns the version now committed: the new version on success, the
    /// prior one when the producer is not primary or nothing changed.
    pub fn run_cycle<F>(&self, populate: F) -> RelayResult<Version>
    where
        F: FnOnce(&mut WriteState<'_>) -> Result<(), BoxError>,
    {
        let mut book = self.cycle.lock();
        let started = Instant::now();
        let listeners = self.listeners.read().clone();
        let prior = self.read_state();

        if !self.enforcer.is_primary() {
            warn!(committed = %prior.version(), "Producer is not primary; skipping cycle");
            self.metrics.record_cycle_skipped();
            notify(&listeners, "cycle_skipped", |l| l.cycle_skipped(prior.version()));
            self.finish_cycle(
                &listeners,
                CycleStatus::Skipped,
                Version::NONE,
                started.elapsed(),
                None,
            );
            return Ok(prior.version());
        }

        let version = self.minter.mint();
        self.enforcer.on_cycle_start(version);
        notify(&listeners, "cycle_start", |l| l.cycle_start(version));
        debug!(version = %version, prior = %prior.version(), "Producer cycle started");

        let outcome = self.execute_cycle(&mut book, &listeners, &prior, version, populate);
        let elapsed = started.elapsed();

        match outcome {
            Ok(CycleOutcome::Published { version, records }) => {
                self.metrics.record_cycle_success(version, records, elapsed);
                info!(
                    version = %version,
                    records,
                    duration_ms = elapsed.as_millis() as u64,
                    "Producer cycle published new version"
                );
                self.finish_cycle(&listeners, CycleStatus::Succeeded, version, elapsed, None);
                Ok(version)
            }
            Ok(CycleOutcome::Unchanged) => {
                self.metrics.record_cycle_without_changes(elapsed);
                info!(
                    version = %prior.version(),
                    "Producer cycle found no changes"
                );
                self.finish_cycle(&listeners, CycleStatus::Unchanged, version, elapsed, None);
                Ok(prior.version())
            }
            Err(err) => {
                self.metrics.record_cycle_failure(elapsed);
                warn!(
                    version = %version,
                    committed = %self.last_committed_version(),
                    error = %err,
                    "Producer cycle failed"
                );
                self.finish_cycle(
                    &listeners,
                    CycleStatus::Failed,
                    version,
                    elapsed,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Loads a published version from `retriever` and makes it the
    /// committed state, so the next cycle emits a delta from it.
    pub fn restore(
        &self,
        version: Version,
        retriever: &dyn BlobRetriever,
    ) -> RelayResult<Arc<ReadState>> {
        let mut book = self.cycle.lock();
        if !version.is_concrete() {
            return Err(RelayError::InvalidTarget { target: version });
        }

        let tracker = FailedTransitionTracker::new();
        let mut state = self.read_state();
        let plan = UpdatePlanner::new(retriever, &tracker).plan(state.version(), version)?;
        for blob in plan.transitions() {
            state = Arc::new(apply_blob(&state, blob)?);
        }

        *self.committed.write() = Arc::clone(&state);
        book.states_since_snapshot = 0;
        book.snapshot_published = true;
        info!(
            version = %state.version(),
            records = state.len(),
            transitions = plan.len(),
            "Producer restored published state"
        );
        Ok(state)
    }

    /// Last committed state.
    pub fn read_state(&self) -> Arc<ReadState> {
        Arc::clone(&self.committed.read())
    }

    pub fn last_committed_version(&self) -> Version {
        self.committed.read().version()
    }

    pub fn metrics(&self) -> &ProducerMetrics {
        &self.metrics
    }

    pub fn enforcer(&self) -> &Arc<dyn SingleProducerEnforcer> {
        &self.enforcer
    }

    pub fn add_listener(&self, listener: Arc<dyn ProducerListener>) {
        self.listeners.write().push(listener);
    }

    pub fn add_validator(&self, validator: Arc<dyn Validator>) {
        self.validators.write().push(validator);
    }

    fn execute_cycle<F>(
        &self,
        book: &mut CycleBookkeeping,
        listeners: &Listeners,
        prior: &Arc<ReadState>,
        version: Version,
        populate: F,
    ) -> RelayResult<CycleOutcome>
    where
        F: FnOnce(&mut WriteState<'_>) -> Result<(), BoxError>,
    {
        if !version.is_concrete() || version <= prior.version() {
            return Err(RelayError::VersionNotIncreasing {
                minted: version,
                current: prior.version(),
            });
        }

        let prior_state: Option<&ReadState> =
            (!prior.version().is_none()).then_some(prior.as_ref());

        let populate_started = Instant::now();
        let dataset = populate_state(version, prior_state, populate)?;
        notify(listeners, "populate_complete", |l| {
            l.populate_complete(version, dataset.len(), populate_started.elapsed())
        });

        if let Some(prior) = prior_state {
            if prior.dataset().as_ref() == &dataset {
                notify(listeners, "no_delta_available", |l| l.no_delta_available(version));
                return Ok(CycleOutcome::Unchanged);
            }
        }

        notify(listeners, "validation_start", |l| l.validation_start(version));
        let validators = self.validators.read().clone();
        let status = run_validators(
            &validators,
            &StagedState {
                version,
                dataset: &dataset,
                prior: prior_state,
            },
        );
        notify(listeners, "validation_complete", |l| {
            l.validation_complete(version, &status)
        });
        if !status.passed() {
            return Err(RelayError::ValidationFailed(status));
        }

        let snapshot_due = prior_state.is_none()
            || book.states_since_snapshot >= self.num_states_between_snapshots;
        let staged = self.stage(prior_state, &dataset, version, snapshot_due)?;

        let publish_started = Instant::now();
        self.publish(book, listeners, staged)?;

        let records = dataset.len();
        let next = Arc::new(ReadState::new(version, Arc::new(dataset)));
        *self.committed.write() = Arc::clone(&next);
        book.states_since_snapshot = if snapshot_due {
            0
        } else {
            book.states_since_snapshot + 1
        };
        notify(listeners, "publish_complete", |l| {
            l.publish_complete(version, publish_started.elapsed())
        });
        notify(listeners, "new_state_committed", |l| l.new_state_committed(&next));

        if let Some(announcer) = &self.announcer {
            let announced = announcer.announce(version);
            notify(listeners, "announcement_complete", |l| {
                l.announcement_complete(version, announced.as_ref().map(|_| ()))
            });
            announced.map_err(|err| RelayError::AnnouncementFailed {
                version,
                source: err.into(),
            })?;
        }

        Ok(CycleOutcome::Published { version, records })
    }

    fn stage(
        &self,
        prior: Option<&ReadState>,
        dataset: &Dataset,
        version: Version,
        snapshot_due: bool,
    ) -> RelayResult<StagedBlobs> {
        let mut deltas = Vec::with_capacity(2);
        if let Some(prior) = prior {
            let transition = plan_transition(prior.dataset(), prior.version(), dataset, version);
            if self.integrity_check {
                check_integrity(prior.dataset(), dataset, version, &transition)?;
            }
            debug!(
                from = %prior.version(),
                to = %version,
                inserted = transition.stats.inserted,
                updated = transition.stats.updated,
                deleted = transition.stats.deleted,
                "Staged delta"
            );
            let StagedTransition {
                forward, reverse, ..
            } = transition;
            deltas.push(self.encode(
                TransitionKey::delta(prior.version(), version),
                BlobPayload::Delta(forward),
            )?);
            deltas.push(self.encode(
                TransitionKey::reverse_delta(version, prior.version()),
                BlobPayload::Delta(reverse),
            )?);
        }

        let snapshot = if snapshot_due {
            Some(self.encode(
                TransitionKey::snapshot(version),
                BlobPayload::Snapshot(dataset.to_image(version)),
            )?)
        } else {
            None
        };

        Ok(StagedBlobs { deltas, snapshot })
    }

    fn encode(&self, key: TransitionKey, payload: BlobPayload) -> RelayResult<Blob> {
        let bytes = format::encode_blob(&key, &payload, &self.codec)?;
        Blob::new(key, Arc::new(BytesSource::new(bytes)))
    }

    fn publish(
        &self,
        book: &mut CycleBookkeeping,
        listeners: &Listeners,
        staged: StagedBlobs,
    ) -> RelayResult<()> {
        for blob in &staged.deltas {
            self.publish_blob(listeners, blob)?;
        }

        let Some(snapshot) = staged.snapshot else {
            return Ok(());
        };

        if !book.snapshot_published {
            if let Err(err) = self.publish_blob(listeners, &snapshot) {
                self.metrics.record_snapshot_failed();
                return Err(err);
            }
            book.snapshot_published = true;
            return Ok(());
        }

        let publisher = Arc::clone(&self.publisher);
        let metrics = self.metrics.clone();
        let listeners = listeners.to_vec();
        self.snapshot_executor.execute(Box::new(move || {
            let transition = snapshot.transition();
            match publisher.publish(&snapshot) {
                Ok(()) => {
                    metrics.record_blob_published(BlobType::Snapshot);
                    debug!(transition = %transition, "Snapshot published");
                    notify(&listeners, "blob_published", |l| l.blob_published(&transition));
                }
                Err(err) => {
                    metrics.record_snapshot_failed();
                    error!(transition = %transition, error = %err, "Snapshot publish failed");
                }
            }
        }));
        Ok(())
    }

    fn publish_blob(&self, listeners: &Listeners, blob: &Blob) -> RelayResult<()> {
        let transition = blob.transition();
        self.publisher
            .publish(blob)
            .map_err(|err| RelayError::PublishFailed {
                transition,
                source: err.into(),
            })?;
        self.metrics.record_blob_published(blob.blob_type());
        debug!(transition = %transition, "Blob published");
        notify(listeners, "blob_published", |l| l.blob_published(&transition));
        Ok(())
    }

    fn finish_cycle(
        &self,
        listeners: &Listeners,
        status: CycleStatus,
        version: Version,
        elapsed: Duration,
        error: Option<String>,
    ) {
        self.enforcer.on_cycle_complete(&status, elapsed);
        let report = CycleReport {
            status,
            version,
            committed: self.last_committed_version(),
            elapsed,
            error,
        };
        notify(listeners, "cycle_complete", |l| l.cycle_complete(&report));
        if let Some(collector) = &self.collector {
            collector.collect(&self.metrics);
        }
    }
}

/// Runs the populate callback against a copy of the prior state.
fn populate_state<F>(
    version: Version,
    prior: Option<&ReadState>,
    populate: F,
) -> RelayResult<Dataset>
where
    F: FnOnce(&mut WriteState<'_>) -> Result<(), BoxError>,
{
    let mut write = WriteState::new(version, prior);
    match panic::catch_unwind(AssertUnwindSafe(|| populate(&mut write))) {
        Ok(Ok(())) => Ok(write.into_dataset()),
        Ok(Err(source)) => Err(RelayError::PopulateFailed { version, source }),
        Err(panic) => Err(RelayError::PopulateFailed {
            version,
            source: format!("populate callback panicked: {}", panic_message(panic.as_ref()))
                .into(),
        }),
    }
}

/// Both directions of a staged transition must reproduce their endpoints.
fn check_integrity(
    prior: &Dataset,
    next: &Dataset,
    version: Version,
    transition: &StagedTransition,
) -> RelayResult<()> {
    let expected = next.checksum();
    let forward = transition.forward.apply_to(prior).checksum();
    if forward != expected {
        return Err(RelayError::IntegrityCheckFailed {
            version,
            reason: format!("forward delta yields {forward:016x}, expected {expected:016x}"),
        });
    }

    let expected = prior.checksum();
    let reverse = transition.reverse.apply_to(next).checksum();
    if reverse != expected {
        return Err(RelayError::IntegrityCheckFailed {
            version,
            reason: format!("reverse delta yields {reverse:016x}, expected {expected:016x}"),
        });
    }
    Ok(())
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("committed", &self.last_committed_version())
            .field(
                "num_states_between_snapshots",
                &self.num_states_between_snapshots,
            )
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
