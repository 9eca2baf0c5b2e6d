use std::path::PathBuf;

/// Directory holding IPC socket files.
const IPC_DIR: &str = "/tmp/influx-bridge";

/// Where the sensor bus publisher can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Unix domain socket named `IPC_DIR/{name}.sock`, for a co-located publisher.
    Ipc(String),
    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Pick a transport from the `BUS_TRANSPORT` setting; anything but
    /// `"ipc"` means TCP.
    pub fn from_parts(kind: &str, host: &str, port: u16, ipc_name: &str) -> Self {
        match kind {
            "ipc" => Self::ipc(ipc_name),
            _ => Self::tcp(host, port),
        }
    }

    /// Socket file backing an IPC transport.
    pub fn ipc_path(&self) -> Option<PathBuf> {
        match self {
            Self::Ipc(name) => Some(PathBuf::from(IPC_DIR).join(format!("{name}.sock"))),
            Self::Tcp { .. } => None,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc://{IPC_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Create the socket directory before binding over IPC.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        match self.ipc_path().as_deref().and_then(|path| path.parent()) {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint())
    }
}
