pub mod smoke;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $executor_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::smoke;

            macro_rules! conformance_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        smoke::init_logger();
                        let executor = ($executor_ctor)();
                        smoke::$name(&executor);
                    }
                };
            }

            conformance_test!(buffer_roundtrip_preserves_items);
            conformance_test!(view_with_wrong_kind_is_rejected);
            conformance_test!(duplicate_insert_is_rejected);
            conformance_test!(matrix_vector_scenario_matches_expected);
            conformance_test!(results_are_visible_through_inserted_handles);
            conformance_test!(chained_descriptions_match_sequential_runs);
            conformance_test!(iterations_repeat_every_step);
            conformance_test!(zero_iterations_leave_buffer_untouched);
            conformance_test!(aliased_operands_read_before_write);
            conformance_test!(random_matvec_matches_host_product);
            conformance_test!(shape_mismatch_is_rejected);
            conformance_test!(unknown_bindings_are_rejected);
            conformance_test!(unsupported_signatures_are_rejected);
            conformance_test!(computation_runs_on_identical_layout);
            conformance_test!(incompatible_buffer_is_rejected);
        }
    };
}
