use vtensor_ukernel_tests::define_lut_norm_tests;

define_lut_norm_tests!(scalar, vtensor_ukernels::u8lut32norm_scalar, threshold: 1);
define_lut_norm_tests!(optimized, vtensor_ukernels::u8lut32norm, threshold: 4);
