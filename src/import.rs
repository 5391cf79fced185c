//! Import drivers - sequence the server lifecycle and the tile imports
//!
//! Each run is a single linear pass: one blocking `server-add` at a time, no
//! retries, and the first failure ends the run.

use crate::cancel::CancelToken;
use crate::config::{
    ServerSettings, TileServerImportConfig, VolumeImportConfig, GRAYSCALE_DATASET,
    GRAYSCALE_TYPE, LABELS_DATASET, LABELS_TYPE,
};
use crate::error::Result;
use crate::plan::{SliceBatch, TileServerPlan, VolumePlan};
use crate::server::{DatastoreHandle, ServerClient, ServerSession};
use crate::types::TileKind;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How an import loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Every scheduled tile was imported
    Completed,
    /// Stopped early on request; tiles after the last import were skipped
    Interrupted,
}

/// Summary of one run
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub uuid: DatastoreHandle,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: ImportOutcome,
    pub slices: usize,
    pub grayscale_tiles: usize,
    pub label_tiles: usize,
}

impl ImportReport {
    pub fn new(uuid: DatastoreHandle) -> Self {
        Self {
            uuid,
            started_at: Utc::now(),
            finished_at: None,
            outcome: ImportOutcome::Completed,
            slices: 0,
            grayscale_tiles: 0,
            label_tiles: 0,
        }
    }

    fn record(&mut self, kind: TileKind) {
        match kind {
            TileKind::Grayscale => self.grayscale_tiles += 1,
            TileKind::Label => self.label_tiles += 1,
        }
    }

    fn finish(&mut self, outcome: ImportOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }

    pub fn total_tiles(&self) -> usize {
        self.grayscale_tiles + self.label_tiles
    }

    pub fn summary(&self) -> String {
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default();
        format!(
            "{:?} import into {}: {} grayscale + {} label tiles over {} slices in {}s",
            self.outcome, self.uuid, self.grayscale_tiles, self.label_tiles, self.slices, elapsed
        )
    }
}

/// Pushes planned tiles to the server one at a time
pub struct TileImporter<'a> {
    client: &'a dyn ServerClient,
    uuid: &'a DatastoreHandle,
    cancel: CancelToken,
}

impl<'a> TileImporter<'a> {
    pub fn new(client: &'a dyn ServerClient, uuid: &'a DatastoreHandle, cancel: CancelToken) -> Self {
        Self {
            client,
            uuid,
            cancel,
        }
    }

    /// Import every batch in order.
    ///
    /// The cancel token is checked before each tile. A failed import stops
    /// the loop at once and is returned to the caller, unless the token was
    /// cancelled by then, in which case the run counts as interrupted.
    pub async fn run<I>(&self, batches: I, report: &mut ImportReport) -> Result<ImportOutcome>
    where
        I: IntoIterator<Item = SliceBatch>,
    {
        for batch in batches {
            for tile in &batch.imports {
                if self.cancel.is_cancelled() {
                    warn!(z = tile.z, dataset = %tile.dataset, "Import interrupted");
                    return Ok(ImportOutcome::Interrupted);
                }
                let added = self
                    .client
                    .server_add(&tile.dataset, self.uuid, tile.offset, &tile.path)
                    .await;
                if let Err(e) = added {
                    // A Ctrl-C that lands mid-import can take the command down with it.
                    if self.cancel.is_cancelled() {
                        warn!(
                            z = tile.z,
                            dataset = %tile.dataset,
                            error = %e,
                            "Import interrupted while adding a tile"
                        );
                        return Ok(ImportOutcome::Interrupted);
                    }
                    error!(
                        z = tile.z,
                        offset = %tile.offset,
                        path = %tile.path.display(),
                        error = %e,
                        "Tile import failed"
                    );
                    return Err(e);
                }
                report.record(tile.kind);
            }
            report.slices += 1;
            info!(
                z = batch.z,
                dataset = %batch.dataset,
                tiles = batch.positions,
                "Added {} {} tiles from z = {}",
                batch.positions,
                batch.dataset,
                batch.z
            );
        }
        Ok(ImportOutcome::Completed)
    }
}

/// Import Raveler tiles into a dataset of a server that is already running
pub async fn run_tile_server_import(
    client: Arc<dyn ServerClient>,
    config: &TileServerImportConfig,
) -> Result<ImportReport> {
    let plan = TileServerPlan::new(config)?;
    info!(
        dataset = %config.dataset,
        uuid = %config.uuid,
        z = %plan.z_range(),
        "{}",
        plan.grid().summary()
    );
    if plan.kinds().is_empty() {
        warn!("Neither superpixels nor grayscale selected; no tiles will be imported");
    }

    let uuid = DatastoreHandle::new(config.uuid.clone());
    let mut report = ImportReport::new(uuid.clone());
    let importer = TileImporter::new(client.as_ref(), &uuid, CancelToken::never());
    let outcome = importer.run(plan.batches(), &mut report).await?;
    report.finish(outcome);
    info!("{}", report.summary());
    Ok(report)
}

/// Create a datastore, fill it from a VoxelProof directory and shut it down.
///
/// Installs a Ctrl-C listener when the config asks for interrupt handling.
pub async fn run_volume_import(
    client: Arc<dyn ServerClient>,
    settings: &ServerSettings,
    config: &VolumeImportConfig,
) -> Result<ImportReport> {
    let cancel = if config.handle_interrupt {
        CancelToken::on_ctrl_c()
    } else {
        CancelToken::never()
    };
    run_volume_import_with_cancel(client, settings, config, cancel).await
}

/// [`run_volume_import`] with a caller-supplied cancel token
pub async fn run_volume_import_with_cancel(
    client: Arc<dyn ServerClient>,
    settings: &ServerSettings,
    config: &VolumeImportConfig,
    cancel: CancelToken,
) -> Result<ImportReport> {
    let extent = config.volume.extent()?;
    let plan = VolumePlan::new(config, extent);
    info!(extent = %extent, "{}", plan.grid().summary());

    let uuid = client
        .init(&config.output_dir, config.volume.config_file())
        .await?;
    info!(uuid = %uuid, "Initialized datastore with root version");

    client.serve(&config.output_dir).await?;
    let session = ServerSession::new(Arc::clone(&client));
    info!(delay = ?settings.settle_delay, "Making sure the server has started");
    tokio::time::sleep(settings.settle_delay).await;

    let mut report = ImportReport::new(uuid.clone());
    let result = fill_volume(&session, &uuid, &plan, cancel, &mut report).await;

    // Shutdown runs on every path once the server is up.
    let shutdown = session.shutdown().await;
    let outcome = match (result, shutdown) {
        (Ok(outcome), Ok(_)) => outcome,
        (Ok(ImportOutcome::Interrupted), Err(e)) => {
            warn!(error = %e, "Shutdown after interrupt failed; server may already be stopped");
            ImportOutcome::Interrupted
        }
        (Ok(ImportOutcome::Completed), Err(e)) => return Err(e),
        (Err(e), Ok(_)) => return Err(e),
        (Err(e), Err(shutdown_err)) => {
            error!(error = %shutdown_err, "Shutdown after failed import also failed");
            return Err(e);
        }
    };

    report.finish(outcome);
    info!("{}", report.summary());
    Ok(report)
}

async fn fill_volume(
    session: &ServerSession,
    uuid: &DatastoreHandle,
    plan: &VolumePlan,
    cancel: CancelToken,
    report: &mut ImportReport,
) -> Result<ImportOutcome> {
    let client = session.client();
    for (name, type_name) in [(GRAYSCALE_DATASET, GRAYSCALE_TYPE), (LABELS_DATASET, LABELS_TYPE)] {
        let out = client.create_dataset(name, type_name).await?;
        info!(dataset = name, type_name, "Created dataset. {}", out.trim());
    }

    TileImporter::new(client, uuid, cancel)
        .run(plan.batches(), report)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InvocationStyle, VolumeSource};
    use crate::error::ImportError;
    use crate::types::{Point3d, TileSize, ZRange};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Init,
        Serve,
        Dataset(String),
        Add(String, String, PathBuf),
        Shutdown,
    }

    /// Records calls; fails the n-th import and/or trips a cancel handle on it
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        fail_at: Option<usize>,
        cancel_after: Option<(usize, crate::cancel::CancelHandle)>,
        shutdown_fails: bool,
    }

    impl Recorder {
        fn adds(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, Call::Add(..)))
                .count()
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.lock().iter().filter(|c| *c == call).count()
        }
    }

    #[async_trait]
    impl ServerClient for Recorder {
        async fn init(&self, _: &Path, _: Option<&Path>) -> Result<DatastoreHandle> {
            self.calls.lock().push(Call::Init);
            Ok(DatastoreHandle::new("root-1"))
        }

        async fn serve(&self, _: &Path) -> Result<()> {
            self.calls.lock().push(Call::Serve);
            Ok(())
        }

        async fn create_dataset(&self, name: &str, _: &str) -> Result<String> {
            self.calls.lock().push(Call::Dataset(name.to_string()));
            Ok(String::new())
        }

        async fn server_add(
            &self,
            dataset: &str,
            uuid: &DatastoreHandle,
            offset: Point3d,
            tile: &Path,
        ) -> Result<String> {
            assert_eq!(uuid.as_str(), "root-1");
            let n = self.adds() + 1;
            if let Some((after, handle)) = &self.cancel_after {
                if n == *after {
                    handle.cancel();
                }
            }
            if self.fail_at == Some(n) {
                return Err(ImportError::Protocol(format!("simulated failure at {}", n)));
            }
            self.calls.lock().push(Call::Add(
                dataset.to_string(),
                offset.to_string(),
                tile.to_path_buf(),
            ));
            Ok(String::new())
        }

        async fn shutdown(&self) -> Result<()> {
            self.calls.lock().push(Call::Shutdown);
            if self.shutdown_fails {
                return Err(ImportError::Protocol("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn settings() -> ServerSettings {
        ServerSettings::default().with_settle_delay(Duration::ZERO)
    }

    fn volume_config() -> VolumeImportConfig {
        VolumeImportConfig {
            source_dir: PathBuf::from("/vp"),
            z_range: ZRange::new(0, 2).unwrap(),
            tile_size: TileSize::new(100, 100).unwrap(),
            volume: VolumeSource::Fixed(Point3d::new(200, 200, 3)),
            output_dir: PathBuf::from("/out"),
            style: InvocationStyle::DatastoreFlag,
            handle_interrupt: false,
        }
    }

    #[tokio::test]
    async fn test_volume_import_lifecycle() {
        let recorder = Arc::new(Recorder::default());
        let report =
            run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), CancelToken::never())
                .await
                .unwrap();

        assert_eq!(report.outcome, ImportOutcome::Completed);
        assert_eq!(report.grayscale_tiles, 12);
        assert_eq!(report.label_tiles, 12);
        assert_eq!(report.slices, 6);

        let calls = recorder.calls.lock().clone();
        assert_eq!(calls[0], Call::Init);
        assert_eq!(calls[1], Call::Serve);
        assert_eq!(calls[2], Call::Dataset("grayscale".into()));
        assert_eq!(calls[3], Call::Dataset("labels".into()));
        assert_eq!(calls.last(), Some(&Call::Shutdown));
        assert_eq!(
            calls[4],
            Call::Add("grayscale".into(), "0,0,0".into(), PathBuf::from("/vp/z/0/0-0.jpg"))
        );
        assert_eq!(
            calls[4 + 11],
            Call::Add("grayscale".into(), "100,100,2".into(), PathBuf::from("/vp/z/2/1-1.jpg"))
        );
        assert_eq!(
            calls[4 + 12],
            Call::Add("labels".into(), "0,0,0".into(), PathBuf::from("/vp/comps/z/0/0-0.png"))
        );
    }

    #[tokio::test]
    async fn test_failed_import_halts_and_shuts_down() {
        let recorder = Arc::new(Recorder {
            fail_at: Some(5),
            ..Default::default()
        });
        let err =
            run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), CancelToken::never())
                .await
                .unwrap_err();

        assert!(matches!(err, ImportError::Protocol(_)));
        assert_eq!(recorder.adds(), 4);
        assert_eq!(recorder.count(&Call::Shutdown), 1);
        assert_eq!(recorder.calls.lock().last(), Some(&Call::Shutdown));
    }

    #[tokio::test]
    async fn test_interrupt_stops_imports_and_shuts_down_once() {
        let (handle, token) = CancelToken::pair();
        let recorder = Arc::new(Recorder {
            cancel_after: Some((6, handle)),
            ..Default::default()
        });
        let report = run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), token)
            .await
            .unwrap();

        assert_eq!(report.outcome, ImportOutcome::Interrupted);
        assert_eq!(recorder.adds(), 6);
        assert_eq!(report.total_tiles(), 6);
        assert_eq!(recorder.count(&Call::Shutdown), 1);
        assert_eq!(recorder.calls.lock().last(), Some(&Call::Shutdown));
    }

    #[tokio::test]
    async fn test_import_killed_by_interrupt_is_not_a_failure() {
        let (handle, token) = CancelToken::pair();
        let recorder = Arc::new(Recorder {
            fail_at: Some(3),
            cancel_after: Some((3, handle)),
            ..Default::default()
        });
        let report = run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), token)
            .await
            .unwrap();

        assert_eq!(report.outcome, ImportOutcome::Interrupted);
        assert_eq!(recorder.adds(), 2);
        assert_eq!(report.total_tiles(), 2);
        assert_eq!(recorder.count(&Call::Shutdown), 1);
    }

    #[tokio::test]
    async fn test_failed_shutdown_after_interrupt_keeps_report() {
        let (handle, token) = CancelToken::pair();
        let recorder = Arc::new(Recorder {
            cancel_after: Some((3, handle)),
            shutdown_fails: true,
            ..Default::default()
        });
        let report = run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), token)
            .await
            .unwrap();

        assert_eq!(report.outcome, ImportOutcome::Interrupted);
        assert_eq!(report.total_tiles(), 3);
        assert_eq!(recorder.count(&Call::Shutdown), 1);
    }

    #[tokio::test]
    async fn test_failed_shutdown_after_completion_is_an_error() {
        let recorder = Arc::new(Recorder {
            shutdown_fails: true,
            ..Default::default()
        });
        let err =
            run_volume_import_with_cancel(recorder.clone(), &settings(), &volume_config(), CancelToken::never())
                .await
                .unwrap_err();

        assert!(matches!(err, ImportError::Protocol(_)));
        assert_eq!(recorder.adds(), 24);
    }

    #[tokio::test]
    async fn test_tile_server_import_uses_absolute_z() {
        let recorder = Arc::new(Recorder::default());
        let config = TileServerImportConfig {
            uuid: "root-1".to_string(),
            dataset: "medulla".to_string(),
            tiles_dir: PathBuf::from("/tiles"),
            range: crate::layout::VoxelRange::from_size(Point3d::new(0, 0, 41), Point3d::new(10, 10, 1))
                .unwrap(),
            load_superpixels: true,
            load_grayscale: false,
        };
        let report = run_tile_server_import(recorder.clone(), &config).await.unwrap();

        assert_eq!(report.label_tiles, 2);
        assert_eq!(report.grayscale_tiles, 0);
        let calls = recorder.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                Call::Add("medulla".into(), "0,0,41".into(), PathBuf::from("/tiles/1024/0/0/0/s/041.png")),
                Call::Add("medulla".into(), "0,0,42".into(), PathBuf::from("/tiles/1024/0/0/0/s/042.png")),
            ]
        );
    }
}
