//! Command handlers.
//!
//! The [`Interpreter`] executes one parsed [`Command`] on behalf of one
//! session and appends the reply to that connection's output buffer. It owns
//! the auto-naming counters, which are shared by every session because all
//! sessions share one directory tree.

use crate::fs::{FileSystem, FsError};
use crate::protocol::parser::Command;
use crate::session::{plain_segments, Session};
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const HELP: [&str; 8] = [
    "ls    view all files and directories\r\n",
    "mkdir [directory]   create directory\r\n",
    "touch [filename]\tcreate file\r\n",
    "cd [path]    change directory\r\ncd .. \tchange directory to up\r\ncd ~\t change directory to root\r\n",
    "rm [filename]/[directory name]    remove file/directory\r\n",
    "copy [filename] [path]    copy file to directory path\r\n",
    "cat [filename]\t\topen file\r\n",
    "nick [name]   change nickname\r\n",
];

const EMPTY_NICKNAME: &[u8] = b"Nickname cannot be empty\r\n";
const EMPTY_FILENAME: &[u8] = b"Filename is empty\r\n";
const EMPTY_REMOVE_TARGET: &[u8] = b"Filename or directory's name is empty\r\n";
const EMPTY_COPY_TARGET: &[u8] = b"Filename or directory's name cannot be empty\r\n";
const EMPTY_DIRECTORY: &[u8] = b"Directory's name is empty\r\n";

/// Upper bound on ids probed for one generated name.
const MAX_GENERATED_NAME_ATTEMPTS: u32 = 1024;

/// Sent to every client right after it connects.
pub fn greeting() -> &'static [u8] {
    b"Hello user!\r\nEnter --help for support info\r\n"
}

/// What the connection should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Send the prompt and keep reading.
    Continue,
    /// Close the connection without a prompt.
    Exit,
}

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    File,
    Folder,
}

/// Executes commands against the served tree.
pub struct Interpreter<F: FileSystem> {
    fs: F,
    root: PathBuf,
    root_label: String,
    next_file_id: u64,
    next_folder_id: u64,
}

impl<F: FileSystem> Interpreter<F> {
    /// Create an interpreter serving `root`.
    pub fn new(fs: F, root: PathBuf) -> Self {
        let root_label = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        Self {
            fs,
            root,
            root_label,
            next_file_id: 0,
            next_folder_id: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the root as shown in the working-directory banner.
    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    /// Run one command for `session`, appending any reply to `out`.
    pub fn execute(
        &mut self,
        command: &Command,
        session: &mut Session,
        out: &mut BytesMut,
    ) -> Outcome {
        trace!(?command, "Processing command");

        match command {
            Command::Help => {
                for entry in HELP {
                    out.extend_from_slice(entry.as_bytes());
                }
            }
            Command::List => self.list(session, out),
            Command::Nick(name) => match name {
                Some(name) => session.set_display_name(name.as_str()),
                None => out.extend_from_slice(EMPTY_NICKNAME),
            },
            Command::Touch(name) => self.create(session, name.as_deref(), EntryKind::File),
            Command::Mkdir(name) => self.create(session, name.as_deref(), EntryKind::Folder),
            Command::Cat(name) => self.cat(session, name.as_deref(), out),
            Command::Remove(name) => self.remove(session, name.as_deref(), out),
            Command::Copy { name, dest } => {
                self.copy(session, name.as_deref(), dest.as_deref(), out)
            }
            Command::Cd(target) => self.cd(session, target.as_deref(), out),
            Command::Exit => return Outcome::Exit,
            Command::Empty | Command::Unknown(_) => {}
        }

        Outcome::Continue
    }

    fn list(&self, session: &Session, out: &mut BytesMut) {
        let dir = session.cwd_path(&self.root);
        match self.fs.list(&dir) {
            Ok(names) => out.extend_from_slice(names.join(" ").as_bytes()),
            Err(e) => debug!(dir = %dir.display(), error = %e, "Listing failed"),
        }
        out.extend_from_slice(b"\r\n");
    }

    /// `touch` / `mkdir`: an existing target is left alone, anything else that
    /// keeps the given name from being used falls back to a generated name.
    fn create(&mut self, session: &Session, name: Option<&str>, kind: EntryKind) {
        if let Some(path) = name.and_then(|name| session.resolve(&self.root, name)) {
            if self.fs.exists(&path) {
                return;
            }
            match self.create_entry(&path, kind) {
                Ok(()) | Err(FsError::AlreadyExists) => return,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Create failed, using generated name")
                }
            }
        }

        let dir = session.cwd_path(&self.root);
        self.create_generated(&dir, kind);
    }

    fn create_generated(&mut self, dir: &Path, kind: EntryKind) {
        for _ in 0..MAX_GENERATED_NAME_ATTEMPTS {
            let name = self.next_generated_name(kind);
            let path = dir.join(&name);
            match self.create_entry(&path, kind) {
                Ok(()) => {
                    debug!(path = %path.display(), "Created entry with generated name");
                    return;
                }
                Err(FsError::AlreadyExists) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Create with generated name failed");
                    return;
                }
            }
        }
        warn!(dir = %dir.display(), "No free generated name");
    }

    fn next_generated_name(&mut self, kind: EntryKind) -> String {
        match kind {
            EntryKind::File => {
                let id = self.next_file_id;
                self.next_file_id += 1;
                format!("new file({id})")
            }
            EntryKind::Folder => {
                let id = self.next_folder_id;
                self.next_folder_id += 1;
                format!("New folder ({id})")
            }
        }
    }

    fn create_entry(&self, path: &Path, kind: EntryKind) -> Result<(), FsError> {
        match kind {
            EntryKind::File => self.fs.create_file(path),
            EntryKind::Folder => self.fs.create_dir(path),
        }
    }

    fn cat(&self, session: &Session, name: Option<&str>, out: &mut BytesMut) {
        let lines = name
            .and_then(|name| session.resolve(&self.root, name))
            .map(|path| self.fs.read_lines(&path));

        match lines {
            Some(Ok(lines)) => {
                for line in lines {
                    out.extend_from_slice(line.as_bytes());
                    out.extend_from_slice(b"\r\n");
                }
            }
            Some(Err(e)) => {
                debug!(error = %e, "cat failed");
                out.extend_from_slice(EMPTY_FILENAME);
            }
            None => out.extend_from_slice(EMPTY_FILENAME),
        }
    }

    fn remove(&self, session: &Session, name: Option<&str>, out: &mut BytesMut) {
        let result = name
            .and_then(|name| session.resolve(&self.root, name))
            .map(|path| self.fs.remove(&path));

        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                debug!(error = %e, "rm failed");
                out.extend_from_slice(EMPTY_REMOVE_TARGET);
            }
            None => out.extend_from_slice(EMPTY_REMOVE_TARGET),
        }
    }

    /// `copy name dest` puts `name` at `dest/<last segment of name>`.
    fn copy(
        &self,
        session: &Session,
        name: Option<&str>,
        dest: Option<&str>,
        out: &mut BytesMut,
    ) {
        let paths = name
            .and_then(|name| session.resolve(&self.root, name))
            .zip(dest.and_then(|dest| session.resolve(&self.root, dest)));

        let (from, dest_dir) = match paths {
            Some(paths) => paths,
            None => {
                out.extend_from_slice(EMPTY_COPY_TARGET);
                return;
            }
        };

        let to = match from.file_name() {
            Some(file_name) => dest_dir.join(file_name),
            None => {
                out.extend_from_slice(EMPTY_COPY_TARGET);
                return;
            }
        };

        if let Err(e) = self.fs.copy(&from, &to) {
            debug!(from = %from.display(), to = %to.display(), error = %e, "copy failed");
            out.extend_from_slice(EMPTY_COPY_TARGET);
        }
    }

    /// Unknown or invalid targets are ignored without a reply.
    fn cd(&self, session: &mut Session, target: Option<&str>, out: &mut BytesMut) {
        match target {
            None => out.extend_from_slice(EMPTY_DIRECTORY),
            Some("~") => session.reset_to_root(),
            Some("..") => {
                session.go_up();
            }
            Some(target) => {
                if let Some(segments) = plain_segments(target) {
                    let mut path = session.cwd_path(&self.root);
                    path.extend(&segments);
                    if self.fs.is_dir(&path) {
                        session.descend(segments);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        root: PathBuf,
        interpreter: Interpreter<LocalFs>,
        session: Session,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("server");
            fs::create_dir(&root).unwrap();
            Self {
                interpreter: Interpreter::new(LocalFs, root.clone()),
                root,
                _dir: dir,
                session: Session::new(),
            }
        }

        fn run(&mut self, line: &str) -> (String, Outcome) {
            let mut out = BytesMut::new();
            let outcome = self
                .interpreter
                .execute(&Command::parse(line), &mut self.session, &mut out);
            (String::from_utf8(out.to_vec()).unwrap(), outcome)
        }

        fn reply(&mut self, line: &str) -> String {
            self.run(line).0
        }
    }

    #[test]
    fn test_root_label() {
        let h = Harness::new();
        assert_eq!(h.interpreter.root_label(), "server");
        assert_eq!(h.interpreter.root(), h.root.as_path());
    }

    #[test]
    fn test_help_lists_every_command() {
        let mut h = Harness::new();
        let reply = h.reply("--help");

        assert!(reply.starts_with("ls    view all files and directories\r\n"));
        assert!(reply.contains("cd ~\t change directory to root\r\n"));
        assert!(reply.ends_with("nick [name]   change nickname\r\n"));
        assert_eq!(reply.matches("\r\n").count(), 10);
    }

    #[test]
    fn test_nick() {
        let mut h = Harness::new();

        assert_eq!(h.reply("nick alice"), "");
        assert_eq!(h.session.display_name(), "alice");

        assert_eq!(h.reply("nick"), "Nickname cannot be empty\r\n");
        assert_eq!(h.session.display_name(), "alice");
    }

    #[test]
    fn test_ls_lists_current_directory() {
        let mut h = Harness::new();
        fs::write(h.root.join("top.txt"), "").unwrap();
        fs::create_dir(h.root.join("demo")).unwrap();
        fs::write(h.root.join("demo").join("inner.txt"), "").unwrap();

        assert_eq!(h.reply("ls"), "demo top.txt\r\n");
        h.reply("cd demo");
        assert_eq!(h.reply("ls"), "inner.txt\r\n");
    }

    #[test]
    fn test_touch_creates_in_cwd() {
        let mut h = Harness::new();
        fs::create_dir(h.root.join("demo")).unwrap();

        h.reply("cd demo");
        assert_eq!(h.reply("touch f.txt"), "");
        assert!(h.root.join("demo").join("f.txt").is_file());
    }

    #[test]
    fn test_touch_existing_is_silent_noop() {
        let mut h = Harness::new();
        let path = h.root.join("a.txt");
        fs::write(&path, "content").unwrap();

        assert_eq!(h.reply("touch a.txt"), "");
        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
        assert_eq!(fs::read_dir(&h.root).unwrap().count(), 1);
    }

    #[test]
    fn test_touch_without_name_never_collides() {
        let mut h = Harness::new();

        h.reply("touch");
        h.reply("touch");

        assert!(h.root.join("new file(0)").is_file());
        assert!(h.root.join("new file(1)").is_file());
    }

    #[test]
    fn test_generated_name_skips_taken_ids() {
        let mut h = Harness::new();
        fs::write(h.root.join("new file(0)"), "taken").unwrap();

        h.reply("touch");

        assert_eq!(
            fs::read_to_string(h.root.join("new file(0)")).unwrap(),
            "taken"
        );
        assert!(h.root.join("new file(1)").is_file());
    }

    #[test]
    fn test_touch_escape_falls_back_to_generated_name() {
        let mut h = Harness::new();

        h.reply("touch ../outside.txt");

        assert!(!h.root.parent().unwrap().join("outside.txt").exists());
        assert!(h.root.join("new file(0)").is_file());
    }

    #[test]
    fn test_mkdir() {
        let mut h = Harness::new();

        assert_eq!(h.reply("mkdir demo"), "");
        assert!(h.root.join("demo").is_dir());

        h.reply("mkdir demo");
        h.reply("mkdir");
        h.reply("mkdir missing/child");
        assert!(h.root.join("New folder (0)").is_dir());
        assert!(h.root.join("New folder (1)").is_dir());
        assert!(!h.root.join("missing").exists());
    }

    #[test]
    fn test_cat() {
        let mut h = Harness::new();
        fs::write(h.root.join("notes.txt"), "one\ntwo\n").unwrap();
        fs::write(h.root.join("empty.txt"), "").unwrap();

        assert_eq!(h.reply("cat notes.txt"), "one\r\ntwo\r\n");
        assert_eq!(h.reply("cat empty.txt"), "");
        assert_eq!(h.reply("cat nonexistent.txt"), "Filename is empty\r\n");
        assert_eq!(h.reply("cat"), "Filename is empty\r\n");
    }

    #[test]
    fn test_rm() {
        let mut h = Harness::new();
        fs::write(h.root.join("a.txt"), "").unwrap();
        fs::create_dir_all(h.root.join("d").join("e")).unwrap();

        assert_eq!(h.reply("rm a.txt"), "");
        assert_eq!(h.reply("rm d"), "");
        assert!(!h.root.join("a.txt").exists());
        assert!(!h.root.join("d").exists());

        assert_eq!(
            h.reply("rm a.txt"),
            "Filename or directory's name is empty\r\n"
        );
        assert_eq!(h.reply("rm"), "Filename or directory's name is empty\r\n");
        assert_eq!(h.reply("rm .."), "Filename or directory's name is empty\r\n");
        assert!(h.root.exists());
    }

    #[test]
    fn test_copy_into_directory() {
        let mut h = Harness::new();
        fs::write(h.root.join("a.txt"), "payload").unwrap();
        fs::create_dir(h.root.join("sub")).unwrap();

        assert_eq!(h.reply("copy a.txt sub"), "");
        assert_eq!(
            fs::read_to_string(h.root.join("sub").join("a.txt")).unwrap(),
            "payload"
        );
        assert!(h.root.join("a.txt").exists());
    }

    #[test]
    fn test_copy_refuses_existing_destination() {
        let mut h = Harness::new();
        fs::write(h.root.join("a.txt"), "new").unwrap();
        fs::create_dir(h.root.join("sub")).unwrap();
        fs::write(h.root.join("sub").join("a.txt"), "old").unwrap();

        assert_eq!(
            h.reply("copy a.txt sub/"),
            "Filename or directory's name cannot be empty\r\n"
        );
        assert_eq!(
            fs::read_to_string(h.root.join("sub").join("a.txt")).unwrap(),
            "old"
        );
    }

    #[test]
    fn test_copy_missing_args() {
        let mut h = Harness::new();
        fs::write(h.root.join("a.txt"), "").unwrap();

        assert_eq!(
            h.reply("copy a.txt"),
            "Filename or directory's name cannot be empty\r\n"
        );
        assert_eq!(
            h.reply("copy"),
            "Filename or directory's name cannot be empty\r\n"
        );
    }

    #[test]
    fn test_cd() {
        let mut h = Harness::new();
        fs::create_dir_all(h.root.join("a").join("b")).unwrap();
        fs::write(h.root.join("file.txt"), "").unwrap();

        assert_eq!(h.reply("cd a"), "");
        assert_eq!(h.reply("cd b"), "");
        assert_eq!(h.session.cwd(), ["a", "b"]);

        h.reply("cd ..");
        assert_eq!(h.session.cwd(), ["a"]);

        h.reply("cd b");
        assert_eq!(h.reply("cd ~"), "");
        assert!(h.session.is_at_root());

        assert_eq!(h.reply("cd .."), "");
        assert!(h.session.is_at_root());

        assert_eq!(h.reply("cd a/b"), "");
        assert_eq!(h.session.cwd(), ["a", "b"]);
        h.reply("cd ~");

        assert_eq!(h.reply("cd nowhere"), "");
        assert_eq!(h.reply("cd file.txt"), "");
        assert_eq!(h.reply("cd ../.."), "");
        assert!(h.session.is_at_root());

        assert_eq!(h.reply("cd"), "Directory's name is empty\r\n");
    }

    #[test]
    fn test_exit_and_unknown() {
        let mut h = Harness::new();

        assert_eq!(h.run("exit"), (String::new(), Outcome::Exit));
        assert_eq!(h.run("frobnicate"), (String::new(), Outcome::Continue));
        assert_eq!(h.run(""), (String::new(), Outcome::Continue));
    }

    #[test]
    fn test_counters_shared_across_sessions() {
        let mut h = Harness::new();
        let mut other = Session::new();

        h.reply("touch");
        let mut out = BytesMut::new();
        h.interpreter
            .execute(&Command::Touch(None), &mut other, &mut out);
        h.reply("touch");

        for id in 0..3 {
            assert!(h.root.join(format!("new file({id})")).is_file());
        }
    }
}
