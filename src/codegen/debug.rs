use std::path::Path;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::debug_info::{
    debug_metadata_version, AsDIScope, DICompileUnit, DIFlags, DIFlagsConstants, DIScope,
    DISubprogram, DIType, DWARFEmissionKind, DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::{FlagBehavior, Module};
use inkwell::values::{FunctionValue, PointerValue};

use crate::ast::{FunctionPrototype, Parameter, TypeInfo, TypeKind};
use crate::token::{SourcePosition, Token};

// DWARF base type encodings (DW_ATE_*); inkwell takes them as raw values.
const DW_ATE_BOOLEAN: u32 = 0x02;
const DW_ATE_FLOAT: u32 = 0x04;
const DW_ATE_SIGNED: u32 = 0x05;
const DW_ATE_UNSIGNED: u32 = 0x07;

/// Emits DWARF metadata alongside the generated IR: a compile unit per
/// module, a subprogram per function, and variable records for parameters
/// and locals. Maintains the stack of active lexical scopes; with no inner
/// scopes in the language, its depth is at most one during body lowering.
pub(crate) struct DebugInfoGenerator<'ctx> {
    context: &'ctx Context,
    builder: DebugInfoBuilder<'ctx>,
    compile_unit: DICompileUnit<'ctx>,
    lexical_scopes: Vec<DISubprogram<'ctx>>,
}

impl<'ctx> DebugInfoGenerator<'ctx> {
    pub fn new(context: &'ctx Context, module: &Module<'ctx>, source_path: &Path) -> Self {
        // Darwin only supports DWARF 2.
        if cfg!(target_os = "macos") {
            module.add_basic_value_flag(
                "Dwarf Version",
                FlagBehavior::Warning,
                context.i32_type().const_int(2, false),
            );
        }
        module.add_basic_value_flag(
            "Debug Info Version",
            FlagBehavior::Warning,
            context
                .i32_type()
                .const_int(u64::from(debug_metadata_version()), false),
        );

        let file_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = source_path
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C,
            &file_name,
            &directory,
            "Solar Compiler",
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );

        Self {
            context,
            builder,
            compile_unit,
            lexical_scopes: Vec::new(),
        }
    }

    /// Points the IR builder's current location at `position` within the
    /// innermost active scope.
    pub fn emit_location(&self, ir_builder: &Builder<'ctx>, position: SourcePosition) {
        let location = self.builder.create_debug_location(
            self.context,
            position.line,
            position.column,
            self.current_scope(),
            None,
        );
        ir_builder.set_current_debug_location(location);
    }

    /// Builds the subroutine type (return type first, parameter types
    /// after) and subprogram for a function, and attaches it.
    pub fn attach_function(
        &self,
        prototype: &FunctionPrototype,
        line: u32,
        function: FunctionValue<'ctx>,
    ) -> DISubprogram<'ctx> {
        let return_type = self.basic_type(prototype.return_type_info);
        let parameter_types = prototype
            .parameters
            .iter()
            .map(|parameter| {
                self.basic_type(parameter.type_info)
                    .expect("function parameter has no debug representation")
            })
            .collect::<Vec<_>>();

        let file = self.compile_unit.get_file();
        let subroutine_type = self.builder.create_subroutine_type(
            file,
            return_type,
            &parameter_types,
            DIFlags::ZERO,
        );

        let subprogram = self.builder.create_function(
            file.as_debug_info_scope(),
            &prototype.name.lexeme,
            None,
            file,
            line,
            subroutine_type,
            false,
            true,
            line,
            DIFlags::PROTOTYPED,
            false,
        );
        function.set_subprogram(subprogram);
        subprogram
    }

    /// Declares a parameter variable at the parameter's line. `number` is
    /// the 1-based argument index.
    pub fn attach_parameter(
        &self,
        parameter: &Parameter,
        number: u32,
        slot: PointerValue<'ctx>,
        block: BasicBlock<'ctx>,
    ) {
        let subprogram = *self
            .lexical_scopes
            .last()
            .expect("parameter outside a function scope");
        let ty = self
            .basic_type(parameter.type_info)
            .expect("function parameter has no debug representation");

        let variable = self.builder.create_parameter_variable(
            subprogram.as_debug_info_scope(),
            &parameter.name.lexeme,
            number,
            self.compile_unit.get_file(),
            parameter.name.position.line,
            ty,
            true,
            DIFlags::ZERO,
        );
        let location = self.builder.create_debug_location(
            self.context,
            parameter.name.position.line,
            0,
            subprogram.as_debug_info_scope(),
            None,
        );
        self.builder.insert_declare_at_end(
            slot,
            Some(variable),
            Some(self.builder.create_expression(vec![])),
            location,
            block,
        );
    }

    /// Declares a local variable record for a `var` declaration.
    pub fn attach_variable(
        &self,
        name: &Token,
        type_info: TypeInfo,
        slot: PointerValue<'ctx>,
        block: BasicBlock<'ctx>,
    ) {
        let subprogram = *self
            .lexical_scopes
            .last()
            .expect("variable declaration outside a function scope");
        let ty = self
            .basic_type(type_info)
            .expect("variable declaration has no debug representation");

        let variable = self.builder.create_auto_variable(
            subprogram.as_debug_info_scope(),
            &name.lexeme,
            self.compile_unit.get_file(),
            name.position.line,
            ty,
            true,
            DIFlags::ZERO,
            0,
        );
        let location = self.builder.create_debug_location(
            self.context,
            name.position.line,
            name.position.column,
            subprogram.as_debug_info_scope(),
            None,
        );
        self.builder.insert_declare_at_end(
            slot,
            Some(variable),
            Some(self.builder.create_expression(vec![])),
            location,
            block,
        );
    }

    pub fn push_scope(&mut self, subprogram: DISubprogram<'ctx>) {
        self.lexical_scopes.push(subprogram);
    }

    pub fn pop_scope(&mut self) {
        self.lexical_scopes.pop();
    }

    /// Must run before the module is emitted or printed.
    pub fn finalize(&self) {
        self.builder.finalize();
    }

    fn current_scope(&self) -> DIScope<'ctx> {
        match self.lexical_scopes.last() {
            Some(subprogram) => subprogram.as_debug_info_scope(),
            None => self.compile_unit.as_debug_info_scope(),
        }
    }

    fn basic_type(&self, type_info: TypeInfo) -> Option<DIType<'ctx>> {
        let (name, encoding) = match type_info.kind {
            TypeKind::Void => return None,
            TypeKind::Bool => ("bool", DW_ATE_BOOLEAN),
            TypeKind::Integer => {
                if type_info.is_signed {
                    (if type_info.size == 32 { "i32" } else { "i64" }, DW_ATE_SIGNED)
                } else {
                    (
                        if type_info.size == 32 { "u32" } else { "u64" },
                        DW_ATE_UNSIGNED,
                    )
                }
            }
            TypeKind::Float => (
                if type_info.size == 32 { "f32" } else { "f64" },
                DW_ATE_FLOAT,
            ),
        };

        let basic_type = self
            .builder
            .create_basic_type(name, u64::from(type_info.size), encoding, DIFlags::ZERO)
            .expect("basic debug types are always nameable");
        Some(basic_type.as_type())
    }
}
