use crate::{ModuleErr, Result, module::ModuleInfo};

use goblin::elf::{Elf, SectionHeader};
use kmod::{
    Module,
    bindings::{
        module_state_MODULE_STATE_COMING, module_state_MODULE_STATE_GOING,
        module_state_MODULE_STATE_LIVE, module_state_MODULE_STATE_UNFORMED,
    },
};

/// Reads a module's ELF image (`.ko`).
pub struct ModuleLoader<'a> {
    elf: Elf<'a>,
    elf_data: &'a [u8],
}

impl<'a> ModuleLoader<'a> {
    /// create a new ELF loader
    pub fn new(elf_data: &'a [u8]) -> Result<Self> {
        let elf = Elf::parse(elf_data).map_err(|_| ModuleErr::InvalidElf)?;
        if !elf.is_64 {
            return Err(ModuleErr::UnsupportedArch);
        }
        Ok(ModuleLoader { elf, elf_data })
    }

    fn find_section(&self, name: &str) -> Result<&SectionHeader> {
        for shdr in &self.elf.section_headers {
            let sec_name = self
                .elf
                .shdr_strtab
                .get_at(shdr.sh_name)
                .ok_or(ModuleErr::InvalidElf)?;

            if sec_name == name {
                return Ok(shdr);
            }
        }
        log::error!("Section '{}' not found", name);
        Err(ModuleErr::InvalidElf)
    }

    /// Parses the `.modinfo` section.
    pub fn read_modinfo(&self) -> Result<ModuleInfo> {
        let modinfo_shdr = self.find_section(".modinfo")?;
        let file_offset = modinfo_shdr.sh_offset as usize;
        let size = modinfo_shdr.sh_size as usize;
        let modinfo_data = file_offset
            .checked_add(size)
            .and_then(|end| self.elf_data.get(file_offset..end))
            .ok_or(ModuleErr::InvalidElf)?;

        log::info!("Reading .modinfo section (size: {:#x})", size);
        let module_info = ModuleInfo::parse(modinfo_data)?;
        if module_info.name().is_none() {
            return Err(ModuleErr::MissingModInfo("name"));
        }
        Ok(module_info)
    }

    pub fn machine(&self) -> &'static str {
        match self.elf.header.e_machine {
            goblin::elf::header::EM_X86_64 => "x86-64",
            goblin::elf::header::EM_AARCH64 => "AArch64",
            goblin::elf::header::EM_RISCV => "RISC-V",
            goblin::elf::header::EM_LOONGARCH => "LoongArch",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loaded,
}

/// A module known to the kernel, and whether its init has run.
pub struct ModuleOwner {
    module_info: ModuleInfo,
    module: &'static Module,
    state: ModuleState,
}

impl ModuleOwner {
    /// Pairs the `__this_module` descriptor of a module with its metadata.
    pub fn new(module: &'static Module, module_info: ModuleInfo) -> Result<Self> {
        let name = module_info.name().ok_or(ModuleErr::MissingModInfo("name"))?;
        if name != module.name() {
            log::error!(
                "Module name mismatch: .modinfo says '{}', module descriptor says '{}'",
                name,
                module.name()
            );
            return Err(ModuleErr::InvalidModInfo);
        }
        Ok(ModuleOwner {
            module_info,
            module,
            state: ModuleState::Unloaded,
        })
    }

    /// Get the name of the module
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.module_info
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Calls the module's init function.
    ///
    /// The module descriptor goes `COMING` then `LIVE`. A failed init leaves
    /// the module unloaded and `UNFORMED`.
    pub fn load(&mut self) -> Result<()> {
        if self.state == ModuleState::Loaded {
            log::warn!("Module({}) is already loaded", self.name());
            return Err(ModuleErr::InvalidOperation);
        }
        match self.module_info.license() {
            Some(_) if self.module_info.is_gpl_compatible() => {}
            Some(license) => log::warn!(
                "{}: module license '{}' taints kernel.",
                self.name(),
                license
            ),
            None => log::warn!("{}: module license unspecified taints kernel.", self.name()),
        }
        self.module.set_state(module_state_MODULE_STATE_COMING);
        if let Some(init_fn) = self.module.init_fn() {
            let ret = unsafe { init_fn() };
            if ret != 0 {
                log::error!("Module({}) init failed: {}", self.name(), ret);
                self.module.set_state(module_state_MODULE_STATE_UNFORMED);
                return Err(ModuleErr::InitFailed(kapi::error::from_errno(ret)));
            }
        }
        self.module.set_state(module_state_MODULE_STATE_LIVE);
        self.state = ModuleState::Loaded;
        log::info!("Module({}) loaded successfully!", self.name());
        Ok(())
    }

    /// Calls the module's exit function while the descriptor is `GOING`,
    /// then marks it `UNFORMED`.
    pub fn unload(&mut self) -> Result<()> {
        if self.state == ModuleState::Unloaded {
            log::warn!("Module({}) is not loaded", self.name());
            return Err(ModuleErr::InvalidOperation);
        }
        self.module.set_state(module_state_MODULE_STATE_GOING);
        if let Some(exit_fn) = self.module.exit_fn() {
            unsafe { exit_fn() };
        }
        self.module.set_state(module_state_MODULE_STATE_UNFORMED);
        self.state = ModuleState::Unloaded;
        log::info!("Module({}) unloaded", self.name());
        Ok(())
    }
}
