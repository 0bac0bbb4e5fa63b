//! Prometheus metrics over a Unix socket.
//!
//! `GET /metrics` (or `/`) returns the text exposition of the VM's
//! registry. The server runs on the supervisor's tokio runtime and is
//! never joined; the runtime going away stops it.

use crate::apis::{ApiObject, Vm};
use crate::error::{Error, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UnixListener;

/// Metrics registry of the VM being served.
#[derive(Clone)]
pub struct VmMetrics {
    registry: Registry,
    uptime: Gauge,
    started: Instant,
}

impl VmMetrics {
    /// Register the metrics of `vm`, starting the uptime clock now.
    pub fn new(vm: &Vm) -> Result<Self> {
        let registry = Registry::new();

        let info = GaugeVec::new(
            Opts::new("ignite_vm_info", "Static information about the VM."),
            &["uid", "name", "cpus", "memory_mib"],
        )?;
        registry.register(Box::new(info.clone()))?;
        let cpus = vm.spec.cpus.to_string();
        let memory = vm.spec.memory.to_string();
        info.with_label_values(&[vm.uid().as_str(), vm.name(), cpus.as_str(), memory.as_str()])
            .set(1.0);

        let uptime = Gauge::with_opts(Opts::new(
            "ignite_vm_uptime_seconds",
            "Seconds since the VM was started.",
        ))?;
        registry.register(Box::new(uptime.clone()))?;

        Ok(Self {
            registry,
            uptime,
            started: Instant::now(),
        })
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String> {
        self.uptime.set(self.started.elapsed().as_secs_f64());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }
}

fn router(metrics: Arc<VmMetrics>) -> Router {
    Router::new()
        .route("/", get(scrape))
        .route("/metrics", get(scrape))
        .with_state(metrics)
}

async fn scrape(State(metrics): State<Arc<VmMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "rendering metrics failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Bind the metrics socket at `path` and serve it on `runtime`.
///
/// A stale socket left by an earlier run is removed first. Returns the
/// bound path so the caller can remove it on teardown.
pub fn serve(
    runtime: &tokio::runtime::Runtime,
    path: &Path,
    metrics: VmMetrics,
) -> Result<PathBuf> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = {
        let _guard = runtime.enter();
        UnixListener::bind(path)?
    };
    tracing::debug!(socket = %path.display(), "serving metrics");

    let app = router(Arc::new(metrics));
    runtime.spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!(error = %e, "metrics server stopped");
        }
    });

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::Uid;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn vm(name: &str) -> Vm {
        let mut vm = Vm::default();
        vm.metadata.uid = Uid::new("abc");
        vm.metadata.name = name.into();
        vm.set_defaults();
        vm
    }

    fn get(path: &Path, target: &str) -> String {
        let mut stream = std::os::unix::net::UnixStream::connect(path).unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_render() {
        let text = VmMetrics::new(&vm("web")).unwrap().render().unwrap();
        assert!(text.contains("# TYPE ignite_vm_info gauge"));
        assert!(text.contains("# TYPE ignite_vm_uptime_seconds gauge"));

        let info = text
            .lines()
            .find(|l| l.starts_with("ignite_vm_info{"))
            .unwrap();
        for label in ["uid=\"abc\"", "name=\"web\"", "cpus=\"1\"", "memory_mib=\"512\""] {
            assert!(info.contains(label), "{} missing from {}", label, info);
        }
        assert!(info.ends_with(" 1"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        let text = VmMetrics::new(&vm("we\"b")).unwrap().render().unwrap();
        assert!(text.contains("name=\"we\\\"b\""), "{}", text);
    }

    #[test]
    fn test_serves_over_socket_and_replaces_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prometheus.sock");
        std::fs::write(&path, b"stale").unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        serve(&runtime, &path, VmMetrics::new(&vm("web")).unwrap()).unwrap();

        let ok = get(&path, "/metrics");
        assert!(ok.starts_with("HTTP/1.1 200 OK"), "{}", ok);
        assert!(ok.contains("ignite_vm_info"));

        let missing = get(&path, "/other");
        assert!(missing.starts_with("HTTP/1.1 404"), "{}", missing);
    }
}
