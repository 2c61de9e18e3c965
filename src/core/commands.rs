use std::fmt;

/// RouterOS commands issued during a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    IdentityPrint,
    BackupSave { name: String },
    Export { file: String },
    FilePrintDetail,
    FileRemove { name: String },
}

impl RemoteCommand {
    pub fn render(&self) -> String {
        match self {
            Self::IdentityPrint => "/system identity print".to_string(),
            Self::BackupSave { name } => format!("/system backup save name={}", name),
            Self::Export { file } => format!("/export file={}", file),
            Self::FilePrintDetail => "/file print detail".to_string(),
            Self::FileRemove { name } => format!("/file remove \"{}\"", name),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_commands() {
        assert_eq!(
            RemoteCommand::BackupSave { name: "Backup_a.backup".into() }.render(),
            "/system backup save name=Backup_a.backup"
        );
        assert_eq!(
            RemoteCommand::Export { file: "Export_a.rsc".into() }.render(),
            "/export file=Export_a.rsc"
        );
        assert_eq!(
            RemoteCommand::FileRemove { name: "Export_a.rsc".into() }.to_string(),
            "/file remove \"Export_a.rsc\""
        );
    }
}
