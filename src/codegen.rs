use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::passes::PassManager;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, PointerValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::ast::{
    Block, Expression, FunctionPrototype, Operation, Program, Statement, TypeInfo, TypeKind, Value,
};
use crate::token::{SourcePosition, Token};

mod debug;

use debug::DebugInfoGenerator;

/// Long-lived code generation state: one LLVM context and one instruction
/// builder, reused across `compile_module` calls.
pub struct CodeGen<'ctx> {
    context: &'ctx Context,
    builder: Builder<'ctx>,
}

impl<'ctx> CodeGen<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            builder: context.create_builder(),
        }
    }

    /// Lowers a parsed program into one LLVM module named after its source
    /// path. `release` enables the optimization pipeline and disables debug
    /// info.
    ///
    /// The AST is assumed well formed and type coherent; violations (calls
    /// to undeclared functions, unknown variables, void operands) panic
    /// rather than surface as user errors.
    pub fn compile_module(
        &self,
        source_path: &Path,
        program: &Program,
        release: bool,
    ) -> Result<Module<'ctx>> {
        let module = self.context.create_module(&source_path.to_string_lossy());

        let debug_info = if release {
            None
        } else {
            Some(DebugInfoGenerator::new(self.context, &module, source_path))
        };

        // printf links against libc so generated programs can produce
        // output without a standard library of their own.
        let i8_pointer = self.context.i8_type().ptr_type(AddressSpace::default());
        let printf_type = self.context.i32_type().fn_type(&[i8_pointer.into()], true);
        module.add_function("printf", printf_type, Some(Linkage::External));

        let pass_manager = PassManager::create(&module);
        if release {
            pass_manager.add_promote_memory_to_register_pass();
            pass_manager.add_gvn_pass();
            pass_manager.add_reassociate_pass();
            pass_manager.add_cfg_simplification_pass();
            pass_manager.add_aggressive_dce_pass();
            pass_manager.add_instruction_combining_pass();
        }
        pass_manager.initialize();

        let mut generator = Generator {
            context: self.context,
            module: &module,
            builder: &self.builder,
            debug_info,
            slots: HashMap::new(),
            pass_manager,
        };

        for statement in &program.statements {
            generator.statement(statement)?;
        }

        if let Some(debug_info) = &generator.debug_info {
            debug_info.finalize();
        }

        Ok(module)
    }
}

/// Per-module lowering state shared by the statement and expression halves
/// of the visitor: the builder, the per-function symbol table mapping
/// variable names to their stack slots, and the optional debug metadata
/// generator.
struct Generator<'a, 'ctx> {
    context: &'ctx Context,
    module: &'a Module<'ctx>,
    builder: &'a Builder<'ctx>,
    debug_info: Option<DebugInfoGenerator<'ctx>>,
    slots: HashMap<String, PointerValue<'ctx>>,
    pass_manager: PassManager<FunctionValue<'ctx>>,
}

impl<'a, 'ctx> Generator<'a, 'ctx> {
    fn statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Expression { expression } => {
                self.expression(expression)?;
                Ok(())
            }
            Statement::VariableDeclaration {
                name,
                type_info,
                initializer,
            } => self.variable_declaration(name, *type_info, initializer),
            Statement::Block(block) => self.block(block),
            Statement::Return { position, value } => self.return_statement(*position, value),
            Statement::Function {
                position,
                prototype,
                body,
            } => self.function(*position, prototype, body),
        }
    }

    fn function(
        &mut self,
        position: SourcePosition,
        prototype: &FunctionPrototype,
        body: &Block,
    ) -> Result<()> {
        let parameter_types = prototype
            .parameters
            .iter()
            .map(|parameter| {
                BasicMetadataTypeEnum::from(
                    basic_type(self.context, parameter.type_info)
                        .expect("function parameter has no value representation"),
                )
            })
            .collect::<Vec<_>>();

        // An unrepresentable return annotation lowers to void.
        let function_type = match basic_type(self.context, prototype.return_type_info) {
            Some(return_type) => return_type.fn_type(&parameter_types, false),
            None => self.context.void_type().fn_type(&parameter_types, false),
        };

        let function = self.module.add_function(
            &prototype.name.lexeme,
            function_type,
            Some(Linkage::External),
        );

        if let Some(debug_info) = &mut self.debug_info {
            let subprogram = debug_info.attach_function(prototype, position.line, function);
            debug_info.push_scope(subprogram);
        }

        // Leading instructions without a location form the prologue; the
        // debugger runs past them when breaking on the function.
        self.builder.unset_current_debug_location();

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        self.slots.clear();
        for (index, parameter) in prototype.parameters.iter().enumerate() {
            let argument = function
                .get_nth_param(index as u32)
                .expect("prototype and function disagree on arity");
            argument.set_name(&parameter.name.lexeme);

            let ty = basic_type(self.context, parameter.type_info)
                .expect("function parameter has no value representation");
            let pointer = self.entry_block_alloca(function, ty, &parameter.name.lexeme)?;

            if let Some(debug_info) = &self.debug_info {
                debug_info.attach_parameter(parameter, index as u32 + 1, pointer, entry);
            }

            self.builder.build_store(pointer, argument)?;
            self.slots.insert(parameter.name.lexeme.clone(), pointer);
        }

        self.block(body)?;

        // Fall through without an explicit return.
        let current = self
            .builder
            .get_insert_block()
            .expect("builder left the function");
        if current.get_terminator().is_none() {
            self.builder.build_return(None)?;
        }

        if let Some(debug_info) = &mut self.debug_info {
            debug_info.pop_scope();
        }

        // The verifier result is advisory: type-incoherent programs are
        // programmer bugs, and the parser's error list is the user-facing
        // error channel.
        function.verify(false);

        self.pass_manager.run_on(&function);

        Ok(())
    }

    fn variable_declaration(
        &mut self,
        name: &Token,
        type_info: TypeInfo,
        initializer: &Expression,
    ) -> Result<()> {
        let ty = basic_type(self.context, type_info)
            .expect("variable declaration has no value representation");
        let function = self.current_function();
        let pointer = self.entry_block_alloca(function, ty, &name.lexeme)?;
        self.slots.insert(name.lexeme.clone(), pointer);

        if let Some(debug_info) = &self.debug_info {
            let block = self
                .builder
                .get_insert_block()
                .expect("builder left the function");
            debug_info.attach_variable(name, type_info, pointer, block);
        }

        let value = self.value(initializer)?;
        self.builder.build_store(pointer, value)?;
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        self.emit_location(block.position);
        for statement in &block.statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn return_statement(&mut self, position: SourcePosition, value: &Expression) -> Result<()> {
        self.emit_location(position);
        let value = self.value(value)?;
        self.builder.build_return(Some(&value))?;
        Ok(())
    }

    /// Lowers an expression to its SSA value. Calls to void functions
    /// produce `None`; every other variant produces a value.
    fn expression(&mut self, expression: &Expression) -> Result<Option<BasicValueEnum<'ctx>>> {
        self.emit_location(expression.position());

        match expression {
            Expression::Literal {
                type_info, value, ..
            } => Ok(Some(self.literal(*type_info, *value))),
            Expression::StringLiteral { value, .. } => Ok(Some(
                self.builder
                    .build_global_string_ptr(value, "str")?
                    .as_pointer_value()
                    .into(),
            )),
            Expression::Variable { name } => {
                let slot = *self
                    .slots
                    .get(&name.lexeme)
                    .unwrap_or_else(|| panic!("Unknown variable '{}'", name.lexeme));
                Ok(Some(self.builder.build_load(slot, &name.lexeme)?))
            }
            Expression::Binop {
                operation,
                left,
                right,
                ..
            } => self.binop(*operation, left, right).map(Some),
            Expression::Condition {
                condition,
                then,
                otherwise,
                ..
            } => self
                .condition(condition, then, otherwise.as_deref())
                .map(Some),
            Expression::Call { name, arguments } => self.call(name, arguments),
        }
    }

    /// Like `expression`, but the value is required.
    fn value(&mut self, expression: &Expression) -> Result<BasicValueEnum<'ctx>> {
        let value = self.expression(expression)?;
        Ok(value.expect("expression does not produce a value"))
    }

    fn literal(&self, type_info: TypeInfo, value: Value) -> BasicValueEnum<'ctx> {
        let ty =
            basic_type(self.context, type_info).expect("literal has no value representation");
        match (ty, value) {
            (BasicTypeEnum::IntType(int_type), _) => {
                let bits = match value {
                    Value::Bool(value) => value as u64,
                    Value::Int32(value) => value as i64 as u64,
                    Value::UInt32(value) => value as u64,
                    Value::Int64(value) => value as u64,
                    Value::UInt64(value) => value,
                    _ => panic!("Unsupported literal/type combination: {type_info:?} {value:?}"),
                };
                int_type.const_int(bits, type_info.is_signed).into()
            }
            (BasicTypeEnum::FloatType(float_type), Value::Float32(value)) => {
                float_type.const_float(f64::from(value)).into()
            }
            (BasicTypeEnum::FloatType(float_type), Value::Float64(value)) => {
                float_type.const_float(value).into()
            }
            _ => panic!("Unsupported literal/type combination: {type_info:?} {value:?}"),
        }
    }

    fn binop(
        &mut self,
        operation: Operation,
        left: &Expression,
        right: &Expression,
    ) -> Result<BasicValueEnum<'ctx>> {
        let left = self.value(left)?;
        let right = self.value(right)?;

        // The left operand's type selects the instruction family, except
        // that division is floating-point if either side is.
        let is_float = left.get_type().is_float_type();

        let value: BasicValueEnum = match operation {
            Operation::Add => {
                if is_float {
                    self.builder
                        .build_float_add(left.into_float_value(), right.into_float_value(), "")?
                        .into()
                } else {
                    self.builder
                        .build_int_add(left.into_int_value(), right.into_int_value(), "")?
                        .into()
                }
            }
            Operation::Subtract => {
                if is_float {
                    self.builder
                        .build_float_sub(left.into_float_value(), right.into_float_value(), "")?
                        .into()
                } else {
                    self.builder
                        .build_int_sub(left.into_int_value(), right.into_int_value(), "")?
                        .into()
                }
            }
            Operation::Multiply => {
                if is_float {
                    self.builder
                        .build_float_mul(left.into_float_value(), right.into_float_value(), "")?
                        .into()
                } else {
                    self.builder
                        .build_int_mul(left.into_int_value(), right.into_int_value(), "")?
                        .into()
                }
            }
            Operation::Divide => {
                if is_float || right.get_type().is_float_type() {
                    self.builder
                        .build_float_div(left.into_float_value(), right.into_float_value(), "")?
                        .into()
                } else {
                    self.builder
                        .build_int_signed_div(left.into_int_value(), right.into_int_value(), "")?
                        .into()
                }
            }
            Operation::Equal
            | Operation::NotEqual
            | Operation::Less
            | Operation::LessEqual
            | Operation::Greater
            | Operation::GreaterEqual => {
                if is_float {
                    let predicate = match operation {
                        Operation::Equal => FloatPredicate::OEQ,
                        Operation::NotEqual => FloatPredicate::ONE,
                        Operation::Less => FloatPredicate::OLT,
                        Operation::LessEqual => FloatPredicate::OLE,
                        Operation::Greater => FloatPredicate::OGT,
                        _ => FloatPredicate::OGE,
                    };
                    self.builder
                        .build_float_compare(
                            predicate,
                            left.into_float_value(),
                            right.into_float_value(),
                            "",
                        )?
                        .into()
                } else {
                    let predicate = match operation {
                        Operation::Equal => IntPredicate::EQ,
                        Operation::NotEqual => IntPredicate::NE,
                        Operation::Less => IntPredicate::SLT,
                        Operation::LessEqual => IntPredicate::SLE,
                        Operation::Greater => IntPredicate::SGT,
                        _ => IntPredicate::SGE,
                    };
                    self.builder
                        .build_int_compare(
                            predicate,
                            left.into_int_value(),
                            right.into_int_value(),
                            "",
                        )?
                        .into()
                }
            }
        };

        Ok(value)
    }

    fn condition(
        &mut self,
        condition: &Expression,
        then: &Expression,
        otherwise: Option<&Expression>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let otherwise =
            otherwise.expect("conditional expression without an else branch has no value");

        let condition = self.value(condition)?;
        let function = self.current_function();

        let then_block = self.context.append_basic_block(function, "then");
        let otherwise_block = self.context.append_basic_block(function, "else");
        let merge_block = self.context.append_basic_block(function, "merge");

        self.builder.build_conditional_branch(
            condition.into_int_value(),
            then_block,
            otherwise_block,
        )?;

        self.builder.position_at_end(then_block);
        let then_value = self.value(then)?;
        self.builder.build_unconditional_branch(merge_block)?;
        // Branch lowering may have opened further blocks; the phi's incoming
        // edge is wherever the builder actually ended up.
        let then_end = self
            .builder
            .get_insert_block()
            .expect("builder left the function");

        self.builder.position_at_end(otherwise_block);
        let otherwise_value = self.value(otherwise)?;
        self.builder.build_unconditional_branch(merge_block)?;
        let otherwise_end = self
            .builder
            .get_insert_block()
            .expect("builder left the function");

        self.builder.position_at_end(merge_block);
        let phi = self
            .builder
            .build_phi(then_value.get_type(), "if_expr_tmp")?;
        phi.add_incoming(&[(&then_value, then_end), (&otherwise_value, otherwise_end)]);

        Ok(phi.as_basic_value())
    }

    fn call(
        &mut self,
        name: &Token,
        arguments: &[Expression],
    ) -> Result<Option<BasicValueEnum<'ctx>>> {
        let function = self
            .module
            .get_function(&name.lexeme)
            .unwrap_or_else(|| panic!("Call to undeclared function '{}'", name.lexeme));

        assert!(
            function.get_type().is_var_arg() || function.count_params() as usize == arguments.len(),
            "Function '{}' expects {} arguments, got {}",
            name.lexeme,
            function.count_params(),
            arguments.len()
        );

        let mut values: Vec<BasicMetadataValueEnum> = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.value(argument)?.into());
        }

        let call = self.builder.build_call(function, &values, "")?;
        Ok(call.try_as_basic_value().left())
    }

    /// Allocas always land at the top of the entry block, regardless of the
    /// current insert point.
    fn entry_block_alloca(
        &self,
        function: FunctionValue<'ctx>,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>> {
        let entry = function
            .get_first_basic_block()
            .expect("function has no entry block");

        let temp_builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => temp_builder.position_before(&first),
            None => temp_builder.position_at_end(entry),
        }

        Ok(temp_builder.build_alloca(ty, name)?)
    }

    fn current_function(&self) -> FunctionValue<'ctx> {
        self.builder
            .get_insert_block()
            .and_then(BasicBlock::get_parent)
            .expect("statement lowered outside a function")
    }

    fn emit_location(&self, position: SourcePosition) {
        if let Some(debug_info) = &self.debug_info {
            debug_info.emit_location(self.builder, position);
        }
    }
}

/// `TypeInfo` → LLVM value type; `Void` has none.
fn basic_type(context: &Context, type_info: TypeInfo) -> Option<BasicTypeEnum<'_>> {
    match type_info.kind {
        TypeKind::Void => None,
        TypeKind::Bool => Some(context.bool_type().into()),
        TypeKind::Integer => Some(if type_info.size == 32 {
            context.i32_type().into()
        } else {
            context.i64_type().into()
        }),
        TypeKind::Float => Some(if type_info.size == 32 {
            context.f32_type().into()
        } else {
            context.f64_type().into()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use inkwell::values::InstructionOpcode;

    fn compile_in<'ctx>(
        context: &'ctx Context,
        source: &str,
        release: bool,
    ) -> Module<'ctx> {
        let (program, errors) = parse_source(source);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        let codegen = CodeGen::new(context);
        codegen
            .compile_module(Path::new("test_module"), &program, release)
            .expect("compile_module")
    }

    fn opcodes(function: FunctionValue<'_>) -> Vec<InstructionOpcode> {
        let mut opcodes = Vec::new();
        let mut block = function.get_first_basic_block();
        while let Some(current) = block {
            let mut instruction = current.get_first_instruction();
            while let Some(value) = instruction {
                opcodes.push(value.get_opcode());
                instruction = value.get_next_instruction();
            }
            block = current.get_next_basic_block();
        }
        opcodes
    }

    #[test]
    fn add_two_function_is_generated() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add_two(n: i32) -> i32 { return n + 2 }",
            false,
        );
        let function = module.get_function("add_two").expect("add_two");

        assert_eq!(
            function.get_type().get_return_type(),
            Some(context.i32_type().into())
        );

        let body = opcodes(function);
        assert!(body.contains(&InstructionOpcode::Add));
        assert_eq!(body.last(), Some(&InstructionOpcode::Return));
    }

    #[test]
    fn local_variables_get_entry_block_allocas() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func local_vars(n: i32) -> i32 { var a: i32 = 1i32  return a + n }",
            false,
        );
        let function = module.get_function("local_vars").expect("local_vars");

        let body = opcodes(function);
        assert!(body.contains(&InstructionOpcode::Alloca));
        assert_eq!(body.last(), Some(&InstructionOpcode::Return));

        // Both the parameter slot and `a` live at the top of the entry
        // block, before any store.
        let entry = function.get_first_basic_block().expect("entry block");
        let first = entry.get_first_instruction().expect("first instruction");
        assert_eq!(first.get_opcode(), InstructionOpcode::Alloca);
    }

    #[test]
    fn greater_than_uses_a_signed_predicate() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func greater_than(n: i64) -> i32 { var a: bool = n > 3  return a }",
            false,
        );

        let printed = module.print_to_string().to_string();
        assert!(printed.contains("icmp sgt"), "{printed}");
    }

    #[test]
    fn well_typed_functions_pass_verification() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add_two(n: i32) -> i32 { return n + 2i32 }",
            false,
        );
        let function = module.get_function("add_two").expect("add_two");

        assert!(function.verify(true));
    }

    #[test]
    fn float_arithmetic_selects_float_instructions() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func scale(x: f64) -> f64 { return x * 2.0 + 0.5 }",
            false,
        );
        let function = module.get_function("scale").expect("scale");

        let body = opcodes(function);
        assert!(body.contains(&InstructionOpcode::FMul));
        assert!(body.contains(&InstructionOpcode::FAdd));
    }

    #[test]
    fn conditional_expressions_lower_to_phi_nodes() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func pick(n: i64) -> i64 { return if n < 3 {1} else {0} }",
            false,
        );
        let function = module.get_function("pick").expect("pick");

        let body = opcodes(function);
        assert!(body.contains(&InstructionOpcode::Phi));

        // then/else/merge plus entry.
        assert_eq!(function.count_basic_blocks(), 4);
    }

    #[test]
    fn every_emitted_block_is_terminated() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func noisy(n: i64) -> i64 { if n < 3 {1} else {0}  return 0 }",
            false,
        );
        let function = module.get_function("noisy").expect("noisy");

        let mut block = function.get_first_basic_block();
        while let Some(current) = block {
            assert!(current.get_terminator().is_some());
            block = current.get_next_basic_block();
        }
    }

    #[test]
    fn functions_without_a_return_fall_through_to_ret_void() {
        let context = Context::create();
        let module = compile_in(&context, "func noop() { 1 }", false);
        let function = module.get_function("noop").expect("noop");

        let body = opcodes(function);
        assert_eq!(body.last(), Some(&InstructionOpcode::Return));
        assert!(function.get_type().get_return_type().is_none());
    }

    #[test]
    fn printf_is_declared_variadic() {
        let context = Context::create();
        let module = compile_in(&context, "func noop() { 1 }", false);
        let printf = module.get_function("printf").expect("printf");

        assert!(printf.get_type().is_var_arg());
        assert_eq!(
            printf.get_type().get_return_type(),
            Some(context.i32_type().into())
        );
    }

    #[test]
    fn string_literals_become_global_c_strings() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func greet() -> i32 { return printf(\"hi\\n\") }",
            false,
        );

        let printed = module.print_to_string().to_string();
        assert!(printed.contains("private unnamed_addr constant"), "{printed}");
        assert!(printed.contains("hi"), "{printed}");
    }

    #[test]
    fn release_mode_promotes_allocas_to_registers() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add_two(n: i32) -> i32 { return n + 2i32 }",
            true,
        );
        let function = module.get_function("add_two").expect("add_two");

        let body = opcodes(function);
        assert!(!body.contains(&InstructionOpcode::Alloca), "{body:?}");
    }

    #[test]
    fn debug_builds_attach_subprograms() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add_two(n: i32) -> i32 { return n + 2 }",
            false,
        );
        let function = module.get_function("add_two").expect("add_two");

        assert!(function.get_subprogram().is_some());
        let printed = module.print_to_string().to_string();
        assert!(printed.contains("DICompileUnit"), "{printed}");
        assert!(printed.contains("DILocalVariable"), "{printed}");
    }

    #[test]
    fn release_builds_carry_no_debug_metadata() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add_two(n: i32) -> i32 { return n + 2i32 }",
            true,
        );

        let printed = module.print_to_string().to_string();
        assert!(!printed.contains("DICompileUnit"), "{printed}");
    }

    #[test]
    fn calls_lower_arguments_left_to_right() {
        let context = Context::create();
        let module = compile_in(
            &context,
            "func add(a: i64, b: i64) -> i64 { return a + b }\n\
             func main() -> i64 { return add(1, 2) }",
            false,
        );
        let function = module.get_function("main").expect("main");

        let body = opcodes(function);
        assert!(body.contains(&InstructionOpcode::Call));
    }
}
