//! Kernel-level confinement for one guest process.
//!
//! Every guest gets the same cage, derived from its launch: the host tree
//! readable, its own scratch directory (plus /dev/null) writable, memory
//! capped, and no network sockets unless the caps relax that. There is no
//! policy to choose — the scratch dir and [`ResourceCaps`] fully determine
//! the confinement.
//!
//! Enforcement is platform-specific:
//! - **Linux**: Landlock rules plus a seccomp socket filter, installed in
//!   the child between fork and exec via [`GuestIsolation::apply_in_child`].
//! - **macOS**: the guest argv is rewritten by
//!   [`GuestIsolation::command_line`] to run under `sandbox-exec` with a
//!   generated Seatbelt profile.
//! - **Elsewhere**: only the rlimit applies; process-level confinement is
//!   the deployment's container boundary.

use crate::caps::ResourceCaps;
use crate::harness::GuestCommand;
use std::path::{Path, PathBuf};

/// Per-launch confinement for a staged guest.
#[derive(Debug, Clone)]
pub struct GuestIsolation {
    scratch_dir: PathBuf,
    allow_network: bool,
    max_memory_bytes: Option<u64>,
}

impl GuestIsolation {
    pub fn for_launch(scratch_dir: &Path, caps: &ResourceCaps) -> Self {
        Self {
            scratch_dir: scratch_dir.to_path_buf(),
            allow_network: caps.allow_network,
            max_memory_bytes: caps.max_memory_bytes,
        }
    }

    /// The argv actually spawned for a staged guest command.
    pub fn command_line(&self, guest: &GuestCommand) -> (String, Vec<String>) {
        #[cfg(target_os = "macos")]
        {
            self.seatbelt_command(guest)
        }
        #[cfg(not(target_os = "macos"))]
        {
            (guest.program.clone(), guest.args.clone())
        }
    }

    /// Confinement applied inside the child between fork and exec.
    ///
    /// Intended for a `pre_exec` closure: nothing here allocates after the
    /// rlimit is in place, and failures abort the exec rather than letting
    /// an unconfined guest run.
    #[cfg(unix)]
    pub fn apply_in_child(&self) -> std::io::Result<()> {
        self.apply_memory_limit()?;

        #[cfg(target_os = "linux")]
        {
            no_new_privs()?;
            self.apply_landlock()?;
            self.apply_socket_filter()?;
        }

        Ok(())
    }

    /// Cap the guest's address space so a runaway allocation dies inside
    /// the guest instead of pressuring the host.
    #[cfg(unix)]
    fn apply_memory_limit(&self) -> std::io::Result<()> {
        let Some(bytes) = self.max_memory_bytes else {
            return Ok(());
        };
        let limit = libc::rlimit {
            rlim_cur: bytes as libc::rlim_t,
            rlim_max: bytes as libc::rlim_t,
        };
        if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

// ─── Linux: Landlock + seccomp ──────────────────────────────────────────

/// PR_SET_NO_NEW_PRIVS, required before Landlock and seccomp.
#[cfg(target_os = "linux")]
fn no_new_privs() -> std::io::Result<()> {
    if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
impl GuestIsolation {
    /// The guest may read the interpreter and its libraries anywhere, but
    /// write only inside its scratch dir and to /dev/null.
    fn apply_landlock(&self) -> std::io::Result<()> {
        use landlock::{
            path_beneath_rules, Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr,
            RulesetCreatedAttr, RulesetStatus, ABI,
        };

        let abi = ABI::V2;
        let status = Ruleset::default()
            .set_compatibility(CompatLevel::BestEffort)
            .handle_access(AccessFs::from_all(abi))
            .and_then(|ruleset| ruleset.create())
            .and_then(|created| {
                created.add_rules(path_beneath_rules(&["/"], AccessFs::from_read(abi)))
            })
            .and_then(|created| {
                let writable = [self.scratch_dir.as_path(), Path::new("/dev/null")];
                created.add_rules(path_beneath_rules(writable, AccessFs::from_all(abi)))
            })
            .and_then(|created| created.restrict_self())
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        if status.ruleset == RulesetStatus::NotEnforced {
            tracing::warn!("Landlock rules were not enforced (kernel may be too old)");
        }
        Ok(())
    }

    /// Classic-BPF seccomp filter denying `socket(2)` for any domain other
    /// than AF_UNIX, which is what "no external egress" means at the
    /// kernel boundary. Skipped entirely when the caps allow network.
    fn apply_socket_filter(&self) -> std::io::Result<()> {
        if self.allow_network {
            return Ok(());
        }

        // AUDIT_ARCH_* values (from <linux/audit.h>), not exposed by the libc crate.
        const AUDIT_ARCH_X86_64: u32 = 0xC000003E;
        const AUDIT_ARCH_AARCH64: u32 = 0xC00000B7;

        // (AUDIT_ARCH value, socket(2) syscall number) for this target.
        let (audit_arch, socket_nr): (u32, u32) = if cfg!(target_arch = "x86_64") {
            (AUDIT_ARCH_X86_64, 41)
        } else if cfg!(target_arch = "aarch64") {
            (AUDIT_ARCH_AARCH64, 198)
        } else {
            tracing::warn!("No seccomp socket filter for this architecture");
            return Ok(());
        };

        // Opcodes over struct seccomp_data: nr at offset 0, arch at 4,
        // first syscall argument at 16.
        const LOAD_W_ABS: u16 = 0x20; // BPF_LD | BPF_W | BPF_ABS
        const JEQ_K: u16 = 0x15; // BPF_JMP | BPF_JEQ | BPF_K
        const RET_K: u16 = 0x06; // BPF_RET | BPF_K
        const RET_ALLOW: u32 = 0x7fff_0000; // SECCOMP_RET_ALLOW
        let ret_eperm: u32 = 0x0005_0000 | libc::EPERM as u32; // SECCOMP_RET_ERRNO

        let program = [
            insn(LOAD_W_ABS, 0, 0, 4),                    // A <- arch
            insn(JEQ_K, 0, 5, audit_arch),                // foreign arch -> allow
            insn(LOAD_W_ABS, 0, 0, 0),                    // A <- syscall nr
            insn(JEQ_K, 0, 3, socket_nr),                 // not socket(2) -> allow
            insn(LOAD_W_ABS, 0, 0, 16),                   // A <- domain arg
            insn(JEQ_K, 1, 0, libc::AF_UNIX as u32),      // AF_UNIX -> allow
            insn(RET_K, 0, 0, ret_eperm),                 // deny with EPERM
            insn(RET_K, 0, 0, RET_ALLOW),
        ];

        let prog = BpfProgram {
            len: program.len() as u16,
            filter: program.as_ptr(),
        };

        let ret = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                libc::SECCOMP_MODE_FILTER,
                &prog as *const BpfProgram,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
#[repr(C)]
struct BpfInsn {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

#[cfg(target_os = "linux")]
#[repr(C)]
struct BpfProgram {
    len: u16,
    filter: *const BpfInsn,
}

#[cfg(target_os = "linux")]
const fn insn(code: u16, jt: u8, jf: u8, k: u32) -> BpfInsn {
    BpfInsn { code, jt, jf, k }
}

// ─── macOS: Seatbelt ────────────────────────────────────────────────────

#[cfg(target_os = "macos")]
impl GuestIsolation {
    fn seatbelt_command(&self, guest: &GuestCommand) -> (String, Vec<String>) {
        let mut argv = Vec::with_capacity(guest.args.len() + 4);
        argv.push("-p".to_string());
        argv.push(self.seatbelt_profile());
        argv.push("--".to_string());
        argv.push(guest.program.clone());
        argv.extend(guest.args.iter().cloned());
        ("/usr/bin/sandbox-exec".to_string(), argv)
    }

    fn seatbelt_profile(&self) -> String {
        // Seatbelt matches resolved paths; /var is a symlink to
        // /private/var, so canonicalize the scratch dir first.
        let scratch = self
            .scratch_dir
            .canonicalize()
            .unwrap_or_else(|_| self.scratch_dir.clone());

        let mut rules = vec![
            "(version 1)".to_string(),
            "(deny default)".to_string(),
            // Interpreters fork helpers and talk to system services.
            "(allow process-exec process-fork)".to_string(),
            "(allow signal)".to_string(),
            "(allow sysctl-read)".to_string(),
            "(allow mach-lookup)".to_string(),
            "(allow file-read*)".to_string(),
            format!("(allow file-write* (subpath \"{}\"))", scratch.display()),
        ];
        if !self.allow_network {
            rules.push("(deny network*)".to_string());
        }
        rules.join("\n")
    }
}
