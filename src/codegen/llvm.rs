//! [`IrBuilder`] over the LLVM C API.

use super::builder::{ArithOp, IrBuilder, RealPredicate};
use libc::c_char;
use llvm_sys::prelude::*;
use llvm_sys::transforms::{instcombine, scalar, util};
use llvm_sys::{core, LLVMRealPredicate};
use std::ffi::{CStr, CString};

fn c_name(name: &str) -> CString {
    // Names come from identifiers and fixed strings and never hold a NUL.
    CString::new(name).unwrap_or_default()
}

pub struct LlvmBuilder {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    double_type: LLVMTypeRef,
    fpm: Option<LLVMPassManagerRef>,
}

impl LlvmBuilder {
    /// With `optimize`, every finished function goes through mem2reg,
    /// instcombine, reassociate, GVN and CFG simplification.
    pub fn new(module_name: &str, optimize: bool) -> LlvmBuilder {
        let name = c_name(module_name);
        unsafe {
            let context = core::LLVMContextCreate();
            let module = core::LLVMModuleCreateWithNameInContext(name.as_ptr() as *const c_char, context);
            let builder = core::LLVMCreateBuilderInContext(context);
            let double_type = core::LLVMDoubleTypeInContext(context);

            let fpm = if optimize {
                let fpm = core::LLVMCreateFunctionPassManagerForModule(module);
                util::LLVMAddPromoteMemoryToRegisterPass(fpm);
                instcombine::LLVMAddInstructionCombiningPass(fpm);
                scalar::LLVMAddReassociatePass(fpm);
                scalar::LLVMAddGVNPass(fpm);
                scalar::LLVMAddCFGSimplificationPass(fpm);
                core::LLVMInitializeFunctionPassManager(fpm);
                Some(fpm)
            } else {
                None
            };

            LlvmBuilder {
                context,
                module,
                builder,
                double_type,
                fpm,
            }
        }
    }

    /// The module in LLVM assembly.
    pub fn print_module(&self) -> String {
        unsafe {
            let text = core::LLVMPrintModuleToString(self.module);
            let s = CStr::from_ptr(text).to_string_lossy().into_owned();
            core::LLVMDisposeMessage(text);
            s
        }
    }
}

impl Drop for LlvmBuilder {
    fn drop(&mut self) {
        unsafe {
            if let Some(fpm) = self.fpm.take() {
                core::LLVMDisposePassManager(fpm);
            }
            core::LLVMDisposeBuilder(self.builder);
            core::LLVMDisposeModule(self.module);
            core::LLVMContextDispose(self.context);
        }
    }
}

impl IrBuilder for LlvmBuilder {
    type Value = LLVMValueRef;
    type Block = LLVMBasicBlockRef;
    type Function = LLVMValueRef;

    fn const_real(&mut self, n: f64) -> LLVMValueRef {
        unsafe { core::LLVMConstReal(self.double_type, n) }
    }

    fn build_arith(
        &mut self,
        op: ArithOp,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
        name: &str,
    ) -> LLVMValueRef {
        let name = c_name(name);
        let name = name.as_ptr() as *const c_char;
        unsafe {
            match op {
                ArithOp::Add => core::LLVMBuildFAdd(self.builder, lhs, rhs, name),
                ArithOp::Sub => core::LLVMBuildFSub(self.builder, lhs, rhs, name),
                ArithOp::Mul => core::LLVMBuildFMul(self.builder, lhs, rhs, name),
            }
        }
    }

    fn build_fcmp(
        &mut self,
        pred: RealPredicate,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
        name: &str,
    ) -> LLVMValueRef {
        let pred = match pred {
            RealPredicate::OrderedLessThan => LLVMRealPredicate::LLVMRealOLT,
            RealPredicate::OrderedNotEqual => LLVMRealPredicate::LLVMRealONE,
        };
        let name = c_name(name);
        unsafe { core::LLVMBuildFCmp(self.builder, pred, lhs, rhs, name.as_ptr() as *const c_char) }
    }

    fn build_bool_to_real(&mut self, value: LLVMValueRef, name: &str) -> LLVMValueRef {
        let name = c_name(name);
        unsafe {
            core::LLVMBuildUIToFP(
                self.builder,
                value,
                self.double_type,
                name.as_ptr() as *const c_char,
            )
        }
    }

    fn build_call(&mut self, callee: LLVMValueRef, args: &[LLVMValueRef], name: &str) -> LLVMValueRef {
        let mut args = args.to_vec();
        let name = c_name(name);
        unsafe {
            core::LLVMBuildCall(
                self.builder,
                callee,
                args.as_mut_ptr(),
                args.len() as u32,
                name.as_ptr() as *const c_char,
            )
        }
    }

    fn build_entry_alloca(&mut self, function: LLVMValueRef, name: &str) -> LLVMValueRef {
        let name = c_name(name);
        unsafe {
            let tmp = core::LLVMCreateBuilderInContext(self.context);
            let entry = core::LLVMGetEntryBasicBlock(function);
            let first = core::LLVMGetFirstInstruction(entry);
            if first.is_null() {
                core::LLVMPositionBuilderAtEnd(tmp, entry);
            } else {
                core::LLVMPositionBuilderBefore(tmp, first);
            }
            let slot = core::LLVMBuildAlloca(tmp, self.double_type, name.as_ptr() as *const c_char);
            core::LLVMDisposeBuilder(tmp);
            slot
        }
    }

    fn build_load(&mut self, slot: LLVMValueRef, name: &str) -> LLVMValueRef {
        let name = c_name(name);
        unsafe { core::LLVMBuildLoad(self.builder, slot, name.as_ptr() as *const c_char) }
    }

    fn build_store(&mut self, value: LLVMValueRef, slot: LLVMValueRef) {
        unsafe {
            core::LLVMBuildStore(self.builder, value, slot);
        }
    }

    fn build_br(&mut self, dest: LLVMBasicBlockRef) {
        unsafe {
            core::LLVMBuildBr(self.builder, dest);
        }
    }

    fn build_cond_br(&mut self, cond: LLVMValueRef, then: LLVMBasicBlockRef, otherwise: LLVMBasicBlockRef) {
        unsafe {
            core::LLVMBuildCondBr(self.builder, cond, then, otherwise);
        }
    }

    fn build_ret(&mut self, value: LLVMValueRef) {
        unsafe {
            core::LLVMBuildRet(self.builder, value);
        }
    }

    fn append_block(&mut self, function: LLVMValueRef, name: &str) -> LLVMBasicBlockRef {
        let name = c_name(name);
        unsafe {
            core::LLVMAppendBasicBlockInContext(self.context, function, name.as_ptr() as *const c_char)
        }
    }

    fn move_block_to_end(&mut self, function: LLVMValueRef, block: LLVMBasicBlockRef) {
        unsafe {
            let last = core::LLVMGetLastBasicBlock(function);
            if last != block {
                core::LLVMMoveBasicBlockAfter(block, last);
            }
        }
    }

    fn position_at_end(&mut self, block: LLVMBasicBlockRef) {
        unsafe { core::LLVMPositionBuilderAtEnd(self.builder, block) }
    }

    fn current_function(&self) -> Option<LLVMValueRef> {
        unsafe {
            let block = core::LLVMGetInsertBlock(self.builder);
            if block.is_null() {
                None
            } else {
                Some(core::LLVMGetBasicBlockParent(block))
            }
        }
    }

    fn get_function(&self, name: &str) -> Option<LLVMValueRef> {
        if name.is_empty() {
            return None;
        }
        let name = c_name(name);
        let f = unsafe { core::LLVMGetNamedFunction(self.module, name.as_ptr() as *const c_char) };
        if f.is_null() {
            None
        } else {
            Some(f)
        }
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> LLVMValueRef {
        let mut param_types = vec![self.double_type; params.len()];
        let fname = c_name(name);
        unsafe {
            let fn_type = core::LLVMFunctionType(
                self.double_type,
                param_types.as_mut_ptr(),
                param_types.len() as u32,
                0,
            );
            let function = core::LLVMAddFunction(self.module, fname.as_ptr() as *const c_char, fn_type);
            for (i, param) in params.iter().enumerate() {
                let pname = c_name(param);
                core::LLVMSetValueName(core::LLVMGetParam(function, i as u32), pname.as_ptr() as *const c_char);
            }
            function
        }
    }

    fn param_count(&self, function: LLVMValueRef) -> usize {
        unsafe { core::LLVMCountParams(function) as usize }
    }

    fn param(&self, function: LLVMValueRef, index: usize) -> LLVMValueRef {
        unsafe { core::LLVMGetParam(function, index as u32) }
    }

    fn has_body(&self, function: LLVMValueRef) -> bool {
        unsafe { core::LLVMCountBasicBlocks(function) > 0 }
    }

    fn delete_function(&mut self, function: LLVMValueRef) {
        if self.current_function() == Some(function) {
            unsafe { core::LLVMClearInsertionPosition(self.builder) }
        }
        unsafe { core::LLVMDeleteFunction(function) }
    }

    fn run_function_passes(&mut self, function: LLVMValueRef) {
        if let Some(fpm) = self.fpm {
            unsafe {
                core::LLVMRunFunctionPassManager(fpm, function);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::toplevel::lower_unit;

    #[test]
    fn test_lower_into_llvm() {
        let (builder, diagnostics) = lower_unit(
            "def foo(a b) a*a + 2*a*b + b*b; foo(1, 2)",
            LlvmBuilder::new("test", true),
        );
        assert!(diagnostics.is_empty());
        let text = builder.print_module();
        assert!(text.contains("define double @foo(double %a, double %b)"), "{}", text);
        assert!(!text.contains("alloca"), "{}", text);
        assert!(text.contains("define double @0()"), "{}", text);
    }

    #[test]
    fn test_failed_function_is_deleted() {
        let (builder, diagnostics) = lower_unit("def bad(x) y; def good(x) x", LlvmBuilder::new("test", false));
        assert_eq!(diagnostics.len(), 1);
        let text = builder.print_module();
        assert!(!text.contains("@bad"), "{}", text);
        assert!(text.contains("@good"), "{}", text);
    }
}
